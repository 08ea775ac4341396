use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use multiview_core::{
    Arg, CallArgs, ConfigError, DynamicsError, DynamicsHandle, Generator, LatentState,
    MultiViewConfig, MultiViewSession, Prediction, with_multi_view,
};
use ndarray::{ArrayD, IxDyn, arr0};

struct SlotGenerator {
    slot: DynamicsHandle,
}

impl Generator for SlotGenerator {
    fn dynamics(&self) -> DynamicsHandle {
        self.slot.clone()
    }

    fn install_dynamics(&mut self, dynamics: DynamicsHandle) -> DynamicsHandle {
        std::mem::replace(&mut self.slot, dynamics)
    }
}

impl SlotGenerator {
    fn run(&self, steps: usize, args: &CallArgs) -> Result<Vec<Prediction>, DynamicsError> {
        let state = LatentState::Tensor(ArrayD::zeros(IxDyn(&[2])));
        (0..steps)
            .map(|step| {
                let time = arr0(step as f32 / steps as f32).into_dyn();
                self.slot.predict(&state, &time, args)
            })
            .collect()
    }
}

fn counting_dynamics(calls: Rc<Cell<usize>>, fail_on: Option<usize>) -> DynamicsHandle {
    DynamicsHandle::from_fn(move |_, _, _| {
        let call = calls.get();
        calls.set(call + 1);
        if Some(call) == fail_on {
            return Err(DynamicsError::network(std::io::Error::other(
                "forward pass failed",
            )));
        }
        Ok(Prediction::Tensor(arr0(1.0).into_dyn()))
    })
}

fn view_batch(num_views: usize) -> CallArgs {
    CallArgs::new(vec![Arg::Tensor(ArrayD::zeros(IxDyn(&[num_views, 4])))])
}

#[test]
fn restores_after_normal_exit_in_both_modes() {
    for mode in ["stochastic", "multidiffusion"] {
        let calls = Rc::new(Cell::new(0));
        let original = counting_dynamics(calls.clone(), None);
        let mut generator = SlotGenerator {
            slot: original.clone(),
        };
        let config = MultiViewConfig::new(3, 4, mode);

        let outputs = with_multi_view(&mut generator, &config, None, |g| {
            assert!(!g.dynamics().same_as(&original), "wrapper installed");
            g.run(4, &view_batch(3))
        })
        .expect("valid config")
        .expect("sampling succeeds");

        assert_eq!(outputs.len(), 4);
        assert!(generator.dynamics().same_as(&original), "{mode} restores");
    }
}

#[test]
fn explicit_end_restores_immediately() {
    let original = counting_dynamics(Rc::new(Cell::new(0)), None);
    let mut generator = SlotGenerator {
        slot: original.clone(),
    };
    let config = MultiViewConfig::new(2, 3, "multidiffusion");

    let session = MultiViewSession::begin(&mut generator, &config, None).expect("begin");
    assert!(!session.dynamics().same_as(&original));
    session.end();

    assert!(generator.dynamics().same_as(&original));
}

#[test]
fn restores_when_the_wrapped_call_fails() {
    for mode in ["stochastic", "multidiffusion"] {
        let calls = Rc::new(Cell::new(0));
        let original = counting_dynamics(calls.clone(), Some(2));
        let mut generator = SlotGenerator {
            slot: original.clone(),
        };
        let config = MultiViewConfig::new(2, 5, mode);

        let result = with_multi_view(&mut generator, &config, None, |g| {
            g.run(5, &view_batch(2))
        })
        .expect("valid config");

        let err = result.expect_err("underlying failure propagates");
        assert!(matches!(err, DynamicsError::Network(_)));
        assert!(err.to_string().contains("forward pass failed"));
        assert_eq!(calls.get(), 3, "{mode}: no retries after the failing call");
        assert!(generator.dynamics().same_as(&original), "{mode} restores");
    }
}

#[test]
fn restores_when_the_sampler_panics() {
    let original = counting_dynamics(Rc::new(Cell::new(0)), None);
    let mut generator = SlotGenerator {
        slot: original.clone(),
    };
    let config = MultiViewConfig::new(2, 3, "stochastic");

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let session = MultiViewSession::begin(&mut generator, &config, None).expect("begin");
        session.run(1, &view_batch(2)).expect("one step");
        panic!("sampler loop aborted");
    }));

    assert!(outcome.is_err());
    assert!(generator.dynamics().same_as(&original));
}

#[test]
fn early_return_restores() {
    fn sample(generator: &mut SlotGenerator) -> Result<usize, DynamicsError> {
        let config = MultiViewConfig::new(2, 2, "multidiffusion");
        let session = MultiViewSession::begin(generator, &config, None)
            .map_err(|err| DynamicsError::sampler(err.to_string()))?;
        let outputs = session.run(4, &view_batch(2))?;
        Ok(outputs.len())
    }

    let original = counting_dynamics(Rc::new(Cell::new(0)), Some(3));
    let mut generator = SlotGenerator {
        slot: original.clone(),
    };
    assert!(sample(&mut generator).is_err());
    assert!(generator.dynamics().same_as(&original));
}

#[test]
fn unsupported_mode_leaves_slot_untouched() {
    let calls = Rc::new(Cell::new(0));
    let original = counting_dynamics(calls.clone(), None);
    let mut generator = SlotGenerator {
        slot: original.clone(),
    };
    let config = MultiViewConfig::new(2, 3, "ensemble");

    let err = MultiViewSession::begin(&mut generator, &config, None)
        .err()
        .expect("unsupported mode rejected");
    assert_eq!(err, ConfigError::UnsupportedMode("ensemble".to_string()));
    assert!(err.to_string().contains("ensemble"));
    assert!(generator.dynamics().same_as(&original));

    let ran = with_multi_view(&mut generator, &config, None, |_| ());
    assert!(ran.is_err());
    assert!(generator.dynamics().same_as(&original));
    assert_eq!(calls.get(), 0);
}

#[test]
fn sequential_sessions_each_restore() {
    let original = counting_dynamics(Rc::new(Cell::new(0)), None);
    let mut generator = SlotGenerator {
        slot: original.clone(),
    };
    for mode in ["multidiffusion", "stochastic", "multidiffusion"] {
        let config = MultiViewConfig::new(2, 2, mode);
        with_multi_view(&mut generator, &config, None, |g| g.run(2, &view_batch(2)))
            .expect("config")
            .expect("run");
        assert!(generator.dynamics().same_as(&original));
    }
}
