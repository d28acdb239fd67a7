//! End-to-end minimum-transit-time problem along a path parameter.
//!
//! State b(s) is the squared path speed, control a(s) its half
//! acceleration: bdot = 2a, transit time = integral of 1/sqrt(b). With
//! b(0) = 1 and |a| <= 1 the optimum rides the acceleration bound, so the
//! transit time is sqrt(3) - 1, independent of grid resolution.

use optal_core::Expr;
use optal_nlp::InteriorPoint;
use optal_ocp::{
    Grid, MultipleShooting, OcpMultiStage, Solution, Stage, StageId, StageOptions, between, eq, ge,
};

fn solve_path_speed(n: usize) -> (OcpMultiStage, StageId, Expr, Expr, Expr, Solution) {
    let v0 = 1.0_f64;
    let mut stage = Stage::new(StageOptions::fixed(1.0));
    let b = stage.state("b").unwrap();
    let a = stage.control("a").unwrap();
    stage.set_der(&b, 2.0 * &a).unwrap();

    // no going back along the path
    stage.subject_to(ge(&b, 0.0)).unwrap();
    for c in between(-1.0, &a, 1.0) {
        stage.subject_to(c).unwrap();
    }
    stage.subject_to(eq(&b, v0 * v0).at_t0()).unwrap();

    let transit = stage.integral(1.0 / (&b).sqrt()).unwrap();
    stage.add_objective(&transit).unwrap();

    stage.set_initial(&b, 1.0).unwrap();
    stage.set_initial(&a, 0.0).unwrap();

    let mut ocp = OcpMultiStage::new();
    let sid = ocp.add_stage(stage).unwrap();
    ocp.method(MultipleShooting::new(n)).unwrap();
    ocp.solver(InteriorPoint::new());
    let sol = ocp.solve().unwrap();
    (ocp, sid, b, a, transit, sol)
}

#[test]
fn converges_to_a_finite_positive_transit_time() {
    let (_ocp, sid, b, a, transit, sol) = solve_path_speed(25);
    let t = sol.value(sid, &transit).unwrap();
    assert!(t.is_finite());
    assert!(t > 0.0);

    // Analytic optimum: ride a = 1, so b(s) = 1 + 2s and
    // T = int_0^1 (1+2s)^(-1/2) ds = sqrt(3) - 1.
    let exact = 3.0_f64.sqrt() - 1.0;
    assert!((t - exact).abs() < 1e-3, "transit {t} vs exact {exact}");

    // The control rides its upper bound.
    let (_, accel) = sol.sample(sid, &a, Grid::Control).unwrap();
    for v in &accel {
        assert!(*v > 0.99 && *v <= 1.0 + 1e-6, "a = {v}");
    }

    // Squared speed grows monotonically from v0^2 to 3.
    let (_, bs) = sol.sample(sid, &b, Grid::Control).unwrap();
    assert!((bs[0] - 1.0).abs() < 1e-6);
    assert!((bs[bs.len() - 1] - 3.0).abs() < 1e-2);
    for w in bs.windows(2) {
        assert!(w[1] >= w[0] - 1e-9);
    }
}

#[test]
fn refining_the_grid_moves_the_transit_time_below_one_percent() {
    let (_ocp1, sid_c, _, _, transit_c, sol_c) = solve_path_speed(25);
    let (_ocp2, sid_f, _, _, transit_f, sol_f) = solve_path_speed(100);
    let t_coarse = sol_c.value(sid_c, &transit_c).unwrap();
    let t_fine = sol_f.value(sid_f, &transit_f).unwrap();

    assert!(t_coarse.is_finite() && t_coarse > 0.0);
    assert!(t_fine.is_finite() && t_fine > 0.0);
    let rel = (t_coarse - t_fine).abs() / t_fine;
    assert!(rel < 0.01, "relative change {rel} exceeds 1%");
}

#[test]
fn refined_sampling_matches_the_decision_grid() {
    let (_ocp, sid, b, _, _, sol) = solve_path_speed(20);
    let refine = 5;
    let (ts, bs) = sol.sample(sid, &b, Grid::Integrator { refine }).unwrap();
    assert_eq!(ts.len(), 20 * refine + 1);

    // b follows 1 + 2s along the refined grid too.
    for (s, bv) in ts.iter().zip(bs.iter()) {
        assert!((bv - (1.0 + 2.0 * s)).abs() < 1e-3, "b({s}) = {bv}");
    }

    // Derived quantities sample through the same path.
    let speed_inv = 1.0 / (&b).sqrt();
    let (_, vals) = sol
        .sample(sid, &speed_inv, Grid::Integrator { refine })
        .unwrap();
    for v in &vals {
        assert!(v.is_finite() && *v > 0.0 && *v <= 1.0 + 1e-6);
    }
}
