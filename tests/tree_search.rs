//! End-to-end tree search scenarios against a scripted LP relaxation.

mod common;

use std::rc::Rc;

use canopy::{
    ChildSelectionRule, MipModel, NodeQueue, NodeResult, PseudocostStore, Search, SearchSettings,
    SolverContext, StabilizerOrbits, Symmetries, VarType,
};

use common::{make_model, unconstrained_binaries, FakeLp, Outcome};

fn context(model: &Rc<MipModel>) -> SolverContext {
    SolverContext::new(Rc::clone(model))
}

fn new_search(lp: FakeLp, ctx: &SolverContext, settings: SearchSettings) -> Search<FakeLp> {
    let pc = PseudocostStore::new(ctx.model.num_cols(), settings.min_reliable as i32);
    Search::new(lp, ctx, pc, &settings)
}

fn install_root(search: &mut Search<FakeLp>, ctx: &SolverContext, queue: &mut NodeQueue) {
    queue.emplace_node(
        Vec::new(),
        Vec::new(),
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
        1,
    );
    let node = queue.pop().unwrap();
    search.install_node(ctx, node);
}

fn plain_settings() -> SearchSettings {
    SearchSettings::default()
        .with_child_selection(ChildSelectionRule::Down)
        .with_min_reliable(0)
}

/// S1: the root LP is already integer feasible; an incumbent is
/// reported exactly once and the node closes without branching.
#[test]
fn integer_feasible_root() {
    let model = make_model(
        vec![-1.0, -1.0],
        vec![(vec![1.0, 1.0], f64::NEG_INFINITY, 2.0)],
        vec![0.0, 0.0],
        vec![1.0, 1.0],
        vec![VarType::Integer, VarType::Integer],
    );
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(&[(0.0, 1.0), (0.0, 1.0)], Outcome::optimal(-2.0, vec![1.0, 1.0]));

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(model.num_cols());
    let mut search = new_search(lp, &ctx, plain_settings());

    install_root(&mut search, &ctx, &mut queue);
    let result = search.dive(&mut ctx, &queue);

    assert_eq!(result, NodeResult::BoundExceeding);
    assert_eq!(ctx.incumbent.obj_val, -2.0);
    assert_eq!(ctx.incumbent.update_count, 1);
    assert_eq!(search.frames().len(), 1);
    assert_eq!(search.frames()[0].opensubtrees, 0);
    assert!((search.tree_weight() - 1.0).abs() < 1e-12);
    assert_eq!(search.num_nodes(), 1);
}

/// S2: a single fractional binary. The dive branches down, finds an
/// incumbent, the backtrack flips to the up branch and improves it, and
/// full closure restores the domain and accounts for the whole tree.
#[test]
fn single_branch_resolves() {
    let model = unconstrained_binaries(vec![-1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(&[(0.0, 1.0)], Outcome::optimal(-0.5, vec![0.5]));
    lp.script(&[(0.0, 0.0)], Outcome::optimal(0.0, vec![0.0]));
    lp.script(&[(1.0, 1.0)], Outcome::optimal(-1.0, vec![1.0]));

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(1);
    let mut search = new_search(lp, &ctx, plain_settings());

    install_root(&mut search, &ctx, &mut queue);
    let result = search.dive(&mut ctx, &queue);
    assert_eq!(result, NodeResult::BoundExceeding);

    // down child found x = 0
    assert_eq!(ctx.incumbent.obj_val, 0.0);
    assert_eq!(ctx.incumbent.update_count, 1);

    // stack/domain coherence: one branching, matching the root frame
    assert_eq!(search.frames().len(), 2);
    let root_decision = search.frames()[0].branching_decision.unwrap();
    assert_eq!(search.local_domain().branching_positions().len(), 1);
    assert_eq!(search.local_domain().domain_change_stack()[0], root_decision);

    // monotone lower bound at child creation
    assert!(search.frames()[1].lower_bound >= search.frames()[0].lower_bound);

    // flip to the up branch
    assert!(search.backtrack(&mut ctx, true));
    assert_eq!(search.frames().len(), 2);
    assert_eq!(search.local_domain().col_lower[0], 1.0);

    let result = search.dive(&mut ctx, &queue);
    assert_eq!(result, NodeResult::BoundExceeding);
    assert_eq!(ctx.incumbent.obj_val, -1.0);
    assert_eq!(ctx.incumbent.update_count, 2);

    // full closure: stack empties, domain returns to the snapshot
    assert!(!search.backtrack(&mut ctx, true));
    assert!(!search.has_node());
    assert_eq!(search.local_domain().col_lower[0], 0.0);
    assert_eq!(search.local_domain().col_upper[0], 1.0);
    assert!(search.local_domain().domain_change_stack().is_empty());

    // tree weight conservation over the closed tree
    assert!((search.tree_weight() - 1.0).abs() < 1e-12);

    search.flush_statistics(&mut ctx);
    assert_eq!(ctx.stats.num_nodes, 3);
    assert!((ctx.stats.pruned_treeweight - 1.0).abs() < 1e-12);
    assert_eq!(search.num_nodes(), 0);
}

/// S3: propagation empties the domain of an installed node; a conflict
/// clause lands in the pool and the subtree's weight is accounted.
#[test]
fn propagation_infeasibility() {
    let model = make_model(
        vec![1.0, 1.0],
        vec![(vec![1.0, 1.0], 2.0, f64::INFINITY)],
        vec![0.0, 0.0],
        vec![1.0, 1.0],
        vec![VarType::Integer, VarType::Integer],
    );
    let lp = FakeLp::new(Rc::clone(&model));

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(2);
    let mut search = new_search(lp, &ctx, plain_settings());

    // a subtree that branched x0 down, making x0 + x1 >= 2 unreachable
    queue.emplace_node(
        vec![canopy::DomainChange::down_branch(0, 0.5)],
        vec![0],
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
        2,
    );
    let node = queue.pop().unwrap();
    search.install_node(&ctx, node);

    let result = search.dive(&mut ctx, &queue);
    assert_eq!(result, NodeResult::DomainInfeasible);
    assert_eq!(ctx.conflict_pool.len(), 1);
    assert_eq!(search.frames()[0].opensubtrees, 0);
    assert!((search.tree_weight() - 0.5).abs() < 1e-12);

    // no sibling anywhere: closure empties the stack and the domain
    assert!(!search.backtrack(&mut ctx, true));
    assert!(search.local_domain().domain_change_stack().is_empty());
}

/// S4: probing the down side of a candidate proves infeasibility; the
/// node converts into a single-sided up split and the selector signals
/// the reduction instead of a candidate.
#[test]
fn strong_branch_single_sided_reduction() {
    let model = unconstrained_binaries(vec![1.0, 1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(
        &[(0.0, 1.0), (0.0, 1.0)],
        Outcome::optimal(1.0, vec![0.5, 0.5]),
    );
    lp.script(
        &[(0.0, 0.0), (0.0, 1.0)],
        Outcome::infeasible().with_iterations(25),
    );

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(2);
    let settings = SearchSettings::default()
        .with_child_selection(ChildSelectionRule::Down)
        .with_min_reliable(8);
    let mut search = new_search(lp, &ctx, settings);

    install_root(&mut search, &ctx, &mut queue);
    assert_eq!(search.evaluate_node(&mut ctx), NodeResult::Open);

    let depth_before = search.current_depth();
    let frames_before = search.frames().len();
    let candidate = search.select_branching_candidate(&mut ctx, &queue, 10_000);

    assert!(candidate.is_none());
    assert_eq!(search.frames().len(), frames_before + 1);

    // the reduced frame lost its sibling and a depth level
    let reduced = &search.frames()[search.frames().len() - 2];
    assert_eq!(reduced.opensubtrees, 0);
    assert_eq!(reduced.skip_depth_count, 1);
    assert_eq!(search.current_depth(), depth_before);

    // the surviving up branch is applied
    assert_eq!(search.local_domain().col_lower[0], 1.0);

    // the probe was expensive enough to force a basis recovery
    assert!(search.relaxation().saw_event("recover_basis"));
}

/// S5: every candidate is reliable, so selection performs zero LP
/// probes.
#[test]
fn reliability_short_circuit() {
    let model = unconstrained_binaries(vec![1.0, 1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(
        &[(0.0, 1.0), (0.0, 1.0)],
        Outcome::optimal(1.0, vec![0.5, 0.5]),
    );

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(2);
    let settings = SearchSettings::default()
        .with_child_selection(ChildSelectionRule::Down)
        .with_min_reliable(1);

    let mut pc = PseudocostStore::new(2, 1);
    for col in 0..2 {
        pc.add_observation(col, 1.0, 1.0);
        pc.add_observation(col, -1.0, 1.0);
    }
    let mut search = Search::new(lp, &ctx, pc, &settings);

    install_root(&mut search, &ctx, &mut queue);
    assert_eq!(search.evaluate_node(&mut ctx), NodeResult::Open);

    let solves_before = search.relaxation().num_solves();
    let sb_before = search.local_sb_lp_iterations();

    let candidate = search.select_branching_candidate(&mut ctx, &queue, 10_000);
    assert!(candidate.is_some());

    assert_eq!(search.local_sb_lp_iterations(), sb_before);
    assert_eq!(search.relaxation().num_solves(), solves_before);
}

/// S6: the LP fails with a numerical error; the driver rebuilds a fresh
/// relaxation with presolve, retries with primal simplex, then interior
/// point, and finally declares the node infeasible.
#[test]
fn lp_failure_fallback() {
    // the only integral column is fixed, so no fallback branching column
    // exists either
    let model = make_model(
        vec![1.0, 1.0],
        Vec::new(),
        vec![1.0, 0.0],
        vec![1.0, 5.0],
        vec![VarType::Integer, VarType::Continuous],
    );
    let lp = FakeLp::new(Rc::clone(&model)); // no scripts: every solve errors

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(2);
    let mut search = new_search(lp, &ctx, plain_settings());

    install_root(&mut search, &ctx, &mut queue);
    let result = search.dive(&mut ctx, &queue);

    assert_eq!(result, NodeResult::LpInfeasible);
    assert_eq!(search.frames()[0].opensubtrees, 0);

    // original solve plus one per fallback stage
    assert_eq!(search.relaxation().num_solves(), 4);
    assert!(search.relaxation().saw_event("presolve:on"));
    assert!(search.relaxation().saw_event("algorithm:primal"));
    assert!(search.relaxation().saw_event("algorithm:ipm"));
}

/// Reduced-cost fixing tightens a bound and re-enters the evaluation
/// pipeline exactly once more.
#[test]
fn reduced_cost_fixing_reenters() {
    let model = make_model(
        vec![1.0],
        Vec::new(),
        vec![0.0],
        vec![10.0],
        vec![VarType::Integer],
    );
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(
        &[(0.0, 10.0)],
        Outcome::optimal(0.0, vec![0.3]).with_reduced_costs(vec![1.0]),
    );
    lp.script(
        &[(0.0, 2.0)],
        Outcome::optimal(0.0, vec![0.3]).with_reduced_costs(vec![1.0]),
    );

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(1);
    let mut search = new_search(lp, &ctx, plain_settings());
    ctx.upper_limit = 2.0;

    install_root(&mut search, &ctx, &mut queue);
    let result = search.evaluate_node(&mut ctx);

    assert_eq!(result, NodeResult::Open);
    assert_eq!(search.local_domain().col_upper[0], 2.0);
    assert_eq!(search.relaxation().num_solves(), 2);
}

fn plunge_setup() -> (Rc<MipModel>, SolverContext, NodeQueue, Search<FakeLp>) {
    let model = unconstrained_binaries(vec![1.0, 1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(
        &[(0.0, 1.0), (0.0, 1.0)],
        Outcome::optimal(0.0, vec![0.5, 0.5]),
    );
    lp.script(
        &[(0.0, 0.0), (0.0, 1.0)],
        Outcome::optimal(1.0, vec![0.0, 0.5]),
    );
    lp.script(
        &[(0.0, 0.0), (0.0, 0.0)],
        Outcome::optimal(2.0, vec![0.0, 0.0]),
    );

    let ctx = context(&model);
    let queue = NodeQueue::new(2);
    let settings = plain_settings();

    // x0 is expensive upward and cheap downward, x1 is balanced; the
    // selector picks x0 and the plunge comparison favors x0's up side
    let mut pc = PseudocostStore::new(2, 0);
    pc.add_observation(0, 1.0, 100.0);
    pc.add_observation(0, -1.0, 0.01);
    pc.add_observation(1, 1.0, 1.0);
    pc.add_observation(1, -1.0, 1.0);

    let search = Search::new(lp, &ctx, pc, &settings);
    (model, ctx, queue, search)
}

/// A plunge abandons the flipped sibling to the queue when an
/// ancestor's unexplored side scores higher.
#[test]
fn backtrack_plunge_suspends_sibling() {
    let (model, mut ctx, mut queue, mut search) = plunge_setup();

    install_root(&mut search, &ctx, &mut queue);
    let result = search.dive(&mut ctx, &queue);
    assert_eq!(result, NodeResult::BoundExceeding);
    assert_eq!(ctx.incumbent.obj_val, 2.0);
    assert_eq!(search.frames().len(), 3);

    assert!(search.backtrack_plunge(&mut ctx, &mut queue));

    // the x1 sibling went to the queue; the search resumed on x0's up
    // side instead
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.num_nodes_down(0), 1);
    assert_eq!(queue.num_nodes_up(1), 1);
    assert_eq!(search.local_domain().col_lower[0], 1.0);

    let suspended = queue.pop().unwrap();
    assert_eq!(suspended.depth, 3);
    assert_eq!(suspended.lower_bound, 1.0);
    assert_eq!(suspended.branchings.len(), 2);

    // replaying the suspended node in a fresh search reaches its leaf
    let mut lp2 = FakeLp::new(Rc::clone(&model));
    lp2.script(
        &[(0.0, 0.0), (1.0, 1.0)],
        Outcome::optimal(1.2, vec![0.0, 1.0]),
    );
    let mut search2 = new_search(lp2, &ctx, plain_settings());
    search2.install_node(&ctx, suspended);
    assert_eq!(search2.current_depth(), 3);

    let result = search2.dive(&mut ctx, &queue);
    assert_eq!(result, NodeResult::BoundExceeding);
    assert_eq!(ctx.incumbent.obj_val, 1.2);
}

/// Suspending the whole stack drains every open node into the queue and
/// restores the global domain.
#[test]
fn open_nodes_to_queue_drains_stack() {
    let (_model, mut ctx, mut queue, mut search) = plunge_setup();

    install_root(&mut search, &ctx, &mut queue);
    assert_eq!(search.dive(&mut ctx, &queue), NodeResult::BoundExceeding);

    search.open_nodes_to_queue(&mut ctx, &mut queue);
    assert!(!search.has_node());
    assert!(search.local_domain().domain_change_stack().is_empty());

    // both remaining open subtrees (x1 up under x0 down, and x0 up)
    // were suspended
    assert_eq!(queue.len(), 2);
}

/// Suspending the current node re-enqueues an equivalent subtree.
#[test]
fn current_node_to_queue_roundtrip() {
    let model = unconstrained_binaries(vec![-1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(&[(0.0, 1.0)], Outcome::optimal(-0.5, vec![0.5]));

    let mut ctx = context(&model);
    let mut queue = NodeQueue::new(1);
    let mut search = new_search(lp, &ctx, plain_settings());

    install_root(&mut search, &ctx, &mut queue);
    assert_eq!(search.evaluate_node(&mut ctx), NodeResult::Open);

    search.current_node_to_queue(&mut ctx, &mut queue);
    assert!(!search.has_node());
    assert_eq!(queue.len(), 1);

    let node = queue.pop().unwrap();
    assert_eq!(node.depth, 1);
    search.install_node(&ctx, node);
    assert_eq!(search.evaluate_node(&mut ctx), NodeResult::Open);
}

/// Forced backtracking to a target depth flips the sibling there
/// without pruning checks.
#[test]
fn backtrack_until_depth_flips_at_target() {
    let (_model, mut ctx, mut queue, mut search) = plunge_setup();

    install_root(&mut search, &ctx, &mut queue);
    assert_eq!(search.dive(&mut ctx, &queue), NodeResult::BoundExceeding);
    assert_eq!(search.current_depth(), 3);

    assert!(search.backtrack_until_depth(2));
    assert_eq!(search.current_depth(), 2);
    // the root's up sibling is now the current node
    assert_eq!(search.local_domain().col_lower[0], 1.0);
}

/// A node limit interrupts the dive without touching the stack.
#[test]
fn limit_interrupts_dive() {
    let model = unconstrained_binaries(vec![-1.0]);
    let mut lp = FakeLp::new(Rc::clone(&model));
    lp.script(&[(0.0, 1.0)], Outcome::optimal(-0.5, vec![0.5]));

    let mut ctx = context(&model);
    ctx.limits.node_limit = Some(1);
    let mut queue = NodeQueue::new(1);
    let mut search = new_search(lp, &ctx, plain_settings());

    install_root(&mut search, &ctx, &mut queue);
    let result = search.dive(&mut ctx, &queue);

    assert_eq!(result, NodeResult::Open);
    assert_eq!(search.frames().len(), 1);
    assert_eq!(search.frames()[0].opensubtrees, 2);
}

/// Global symmetry orbits survive installation only when every
/// branching on the path preserves them.
#[test]
fn install_node_checks_orbit_validity() {
    let model = unconstrained_binaries(vec![1.0, 1.0, 1.0]);
    let mut ctx = context(&model);
    ctx.symmetries = Some(Symmetries::new(3, vec![vec![0, 1, 2]], 1));
    ctx.global_orbits = Some(Rc::new(StabilizerOrbits::new(&[vec![0, 1, 2]])));

    // a down branch on a binary keeps the orbits
    let lp = FakeLp::new(Rc::clone(&model));
    let mut search = new_search(lp, &ctx, plain_settings());
    search.install_node(
        &ctx,
        canopy::OpenNode {
            domchg_stack: vec![canopy::DomainChange::down_branch(0, 0.5)],
            branchings: vec![0],
            lower_bound: f64::NEG_INFINITY,
            estimate: f64::NEG_INFINITY,
            depth: 2,
        },
    );
    assert!(search.frames()[0].stabilizer_orbits.is_some());

    // fixing a symmetry-active binary to 1 invalidates them
    let lp = FakeLp::new(Rc::clone(&model));
    let mut search = new_search(lp, &ctx, plain_settings());
    search.install_node(
        &ctx,
        canopy::OpenNode {
            domchg_stack: vec![canopy::DomainChange::up_branch(1, 0.5)],
            branchings: vec![0],
            lower_bound: f64::NEG_INFINITY,
            estimate: f64::NEG_INFINITY,
            depth: 2,
        },
    );
    assert!(search.frames()[0].stabilizer_orbits.is_none());
}
