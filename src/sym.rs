//! Symmetry stabilizers and orbital fixing.
//!
//! Symmetry detection lives in the enclosing solver; the search only
//! receives the permutation orbits, checks which branchings keep a
//! stabilizer valid, and applies orbital fixing after propagation.

use std::rc::Rc;

use crate::domain::{BoundType, Domain, DomainChange};

/// Orbits of the symmetry stabilizer valid at some node.
///
/// Shared between node frames; a child inherits its parent's handle
/// whenever the branching was orbit-preserving.
#[derive(Debug, Clone)]
pub struct StabilizerOrbits {
    /// Columns contained in some non-trivial orbit, ascending.
    pub orbit_cols: Vec<usize>,

    /// Orbit `i` spans `orbit_cols[orbit_starts[i]..orbit_starts[i+1]]`.
    orbit_starts: Vec<usize>,
}

impl StabilizerOrbits {
    /// Build from an orbit partition; singleton orbits are dropped.
    pub fn new(orbits: &[Vec<usize>]) -> Self {
        let mut orbit_cols = Vec::new();
        let mut orbit_starts = vec![0];
        for orbit in orbits {
            if orbit.len() < 2 {
                continue;
            }
            orbit_cols.extend_from_slice(orbit);
            orbit_starts.push(orbit_cols.len());
        }
        Self {
            orbit_cols,
            orbit_starts,
        }
    }

    /// Number of non-trivial orbits.
    pub fn num_orbits(&self) -> usize {
        self.orbit_starts.len() - 1
    }

    /// Whether the stabilizer fixes this column (it sits in no
    /// non-trivial orbit).
    pub fn is_stabilized(&self, col: usize) -> bool {
        !self
            .orbit_starts
            .windows(2)
            .any(|w| self.orbit_cols[w[0]..w[1]].contains(&col))
    }

    /// Fix variables forced by symmetry: once any member of an orbit is
    /// fixed to zero, every member can be. Returns the number of new
    /// fixings.
    pub fn orbital_fixing(&self, dom: &mut Domain) -> usize {
        let mut num_fixed = 0;
        for w in self.orbit_starts.windows(2) {
            let orbit = &self.orbit_cols[w[0]..w[1]];
            let any_zero = orbit.iter().any(|&c| dom.col_upper[c] == 0.0);
            if !any_zero {
                continue;
            }
            for &c in orbit {
                if dom.col_upper[c] > 0.0 {
                    dom.tighten_bound(DomainChange {
                        column: c,
                        bound_type: BoundType::Upper,
                        bound_val: 0.0,
                    });
                    num_fixed += 1;
                    if dom.infeasible() {
                        return num_fixed;
                    }
                }
            }
        }
        num_fixed
    }
}

/// Global symmetry information registered by the enclosing solver.
#[derive(Debug, Clone, Default)]
pub struct Symmetries {
    /// Number of registered permutations.
    pub num_perms: usize,

    /// Position of each column among the symmetry-active columns, or
    /// `-1` when no permutation moves it.
    pub column_position: Vec<i32>,

    orbits: Vec<Vec<usize>>,
}

impl Symmetries {
    /// Register an orbit partition over `num_cols` columns.
    pub fn new(num_cols: usize, orbits: Vec<Vec<usize>>, num_perms: usize) -> Self {
        let mut column_position = vec![-1; num_cols];
        let mut next = 0;
        for orbit in &orbits {
            for &col in orbit {
                if column_position[col] == -1 {
                    column_position[col] = next;
                    next += 1;
                }
            }
        }
        Self {
            num_perms,
            column_position,
            orbits,
        }
    }

    /// Whether some permutation moves this column.
    pub fn is_active(&self, col: usize) -> bool {
        self.column_position
            .get(col)
            .map_or(false, |&p| p != -1)
    }

    /// Stabilizer orbits valid for the given local domain: the stored
    /// orbits restricted to columns still at their global binary bounds.
    pub fn compute_stabilizer_orbits(&self, dom: &Domain) -> Rc<StabilizerOrbits> {
        let restricted: Vec<Vec<usize>> = self
            .orbits
            .iter()
            .map(|orbit| {
                orbit
                    .iter()
                    .copied()
                    .filter(|&c| {
                        dom.is_global_binary(c)
                            && dom.col_lower[c] == 0.0
                            && dom.col_upper[c] == 1.0
                    })
                    .collect()
            })
            .collect();
        Rc::new(StabilizerOrbits::new(&restricted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MipModel, VarType};
    use sprs::TriMat;

    fn binary_model(n: usize) -> Rc<MipModel> {
        let tri: TriMat<f64> = TriMat::new((0, n));
        Rc::new(
            MipModel::new(
                vec![0.0; n],
                tri.to_csr(),
                vec![],
                vec![],
                vec![0.0; n],
                vec![1.0; n],
                vec![VarType::Integer; n],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_stabilized_columns() {
        let orbits = StabilizerOrbits::new(&[vec![0, 1, 2], vec![4]]);
        assert_eq!(orbits.num_orbits(), 1);
        assert!(!orbits.is_stabilized(0));
        assert!(orbits.is_stabilized(3));
        // singleton orbits are trivial
        assert!(orbits.is_stabilized(4));
    }

    #[test]
    fn test_orbital_fixing() {
        let mut dom = Domain::new(binary_model(3));
        let orbits = StabilizerOrbits::new(&[vec![0, 1, 2]]);

        dom.change_bound(DomainChange::down_branch(1, 0.5)); // x1 = 0
        let fixed = orbits.orbital_fixing(&mut dom);
        assert_eq!(fixed, 2);
        assert_eq!(dom.col_upper[0], 0.0);
        assert_eq!(dom.col_upper[2], 0.0);
    }

    #[test]
    fn test_orbital_fixing_noop() {
        let mut dom = Domain::new(binary_model(3));
        let orbits = StabilizerOrbits::new(&[vec![0, 1, 2]]);
        assert_eq!(orbits.orbital_fixing(&mut dom), 0);
    }

    #[test]
    fn test_stabilizer_restriction() {
        let model = binary_model(3);
        let sym = Symmetries::new(3, vec![vec![0, 1, 2]], 2);
        assert!(sym.is_active(0));

        let mut dom = Domain::new(model);
        dom.change_bound(DomainChange::up_branch(2, 0.5)); // x2 fixed to 1
        let stab = sym.compute_stabilizer_orbits(&dom);
        assert_eq!(stab.orbit_cols, vec![0, 1]);
    }
}
