use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use multiview_core::{
    Arg, CallArgs, DynamicsHandle, Generator, LatentState, MultiViewConfig, MultiViewSession,
    ViewObserver, ViewTrace, with_multi_view,
};
use multiview_sampler::{AnchorNetwork, EulerSampler};
use ndarray::{ArrayD, IxDyn, arr0};

fn anchors(values: &[f32], width: usize) -> Arg {
    let data = values
        .iter()
        .flat_map(|&value| std::iter::repeat(value).take(width))
        .collect();
    Arg::Tensor(ArrayD::from_shape_vec(IxDyn(&[values.len(), width]), data).expect("shape"))
}

fn traced() -> (Rc<RefCell<ViewTrace>>, Option<Box<dyn ViewObserver>>) {
    let trace = Rc::new(RefCell::new(ViewTrace::new()));
    let observer: Box<dyn ViewObserver> = Box::new(trace.clone());
    (trace, Some(observer))
}

#[test]
fn multidiffusion_blends_shape_but_not_pose() {
    let steps = 20;
    let network = DynamicsHandle::new(AnchorNetwork::default());
    let mut sampler = EulerSampler::new(network.clone(), steps);
    let (trace, observer) = traced();

    let mut fields = BTreeMap::new();
    fields.insert("shape".to_string(), ArrayD::zeros(IxDyn(&[4])));
    fields.insert("rotation".to_string(), ArrayD::zeros(IxDyn(&[2])));
    let args = CallArgs::new(vec![anchors(&[1.0, 2.0, 6.0], 3)]);

    let config = MultiViewConfig::new(3, steps, "multidiffusion");
    let finished = with_multi_view(&mut sampler, &config, observer, |s| {
        s.sample(LatentState::Fields(fields), &args)
    })
    .expect("config")
    .expect("sample");

    let LatentState::Fields(fields) = finished else {
        panic!("mapping state expected");
    };
    // Both fields relax by the same factor, toward mean anchor 3 and view-0 anchor 1.
    let shape = fields["shape"].mean().expect("shape mean");
    let rotation = fields["rotation"].mean().expect("rotation mean");
    assert!(rotation > 0.5 && rotation < 1.0, "rotation {rotation}");
    assert!((shape / rotation - 3.0).abs() < 1e-4, "shape {shape}, rotation {rotation}");

    assert_eq!(trace.borrow().views().len(), 3 * steps);
    assert_eq!(trace.borrow().coverage(3), vec![steps; 3]);
    assert!(sampler.dynamics().same_as(&network));
}

#[test]
fn stochastic_follows_one_view_per_step() {
    let network = DynamicsHandle::new(AnchorNetwork::default());
    let mut sampler = EulerSampler::new(network.clone(), 4);
    let (trace, observer) = traced();
    let args = CallArgs::new(vec![anchors(&[0.0, 4.0], 1)]);
    let config = MultiViewConfig::new(2, 4, "stochastic");

    let finished = {
        let session = MultiViewSession::begin(&mut sampler, &config, observer).expect("begin");
        session
            .sample(LatentState::Tensor(arr0(0.0).into_dyn()), &args)
            .expect("sample")
    };

    // Anchors visited: 0, 4, 0, 4 with dt = 0.25.
    let LatentState::Tensor(x) = finished else {
        panic!("tensor state expected");
    };
    let value = x.iter().next().copied().expect("scalar");
    assert!((value - 1.5625).abs() < 1e-6, "value {value}");
    assert_eq!(trace.borrow().views(), &[0, 1, 0, 1]);
    assert!(sampler.dynamics().same_as(&network));
}

#[test]
fn single_view_multidiffusion_matches_plain_sampling() {
    let args = CallArgs::new(vec![anchors(&[2.5], 2)]);
    let initial = LatentState::Tensor(ArrayD::zeros(IxDyn(&[3])));

    let plain = EulerSampler::new(DynamicsHandle::new(AnchorNetwork::default()), 8)
        .sample(initial.clone(), &args)
        .expect("plain");

    let mut sampler = EulerSampler::new(DynamicsHandle::new(AnchorNetwork::default()), 8);
    let config = MultiViewConfig::new(1, 8, "multidiffusion");
    let fused = with_multi_view(&mut sampler, &config, None, |s| s.sample(initial, &args))
        .expect("config")
        .expect("fused");

    assert_eq!(plain, fused);
}
