//! Scoped installation of multi-view wrappers on a [`Generator`].

mod multidiffusion;
mod stochastic;

use std::ops::{Deref, DerefMut};

use tracing::{Level, event};

use crate::config::{ConfigError, MultiViewConfig, ViewMode};
use crate::dynamics::{DynamicsHandle, Generator};
use crate::fuse::PredictionFuser;
use crate::observer::ViewObserver;

use multidiffusion::MultidiffusionDynamics;
use stochastic::StochasticDynamics;

/// Guard that keeps a multi-view wrapper installed on a generator.
///
/// The generator's original prediction function is captured when the
/// session begins and reinstalled exactly once when the guard is dropped,
/// whether the scope ends normally, through an early `?` return, or by
/// unwinding. Run the sampler through the guard, which dereferences to the
/// generator.
///
/// Sessions must not be nested on the same generator: each one restores
/// whatever was installed when it began.
pub struct MultiViewSession<'g, G: Generator + ?Sized> {
    generator: &'g mut G,
    original: Option<DynamicsHandle>,
    mode: ViewMode,
}

impl<'g, G: Generator + ?Sized> MultiViewSession<'g, G> {
    /// Validate `config` and install the wrapper for its mode.
    ///
    /// Configuration errors are returned before the generator is touched.
    pub fn begin(
        generator: &'g mut G,
        config: &MultiViewConfig,
        observer: Option<Box<dyn ViewObserver>>,
    ) -> Result<Self, ConfigError> {
        let mode = config.validate()?;
        let original = generator.dynamics();

        let wrapper = match mode {
            ViewMode::Stochastic => DynamicsHandle::new(StochasticDynamics::new(
                original.clone(),
                config.num_views,
                config.num_steps,
                observer,
            )),
            ViewMode::Multidiffusion => DynamicsHandle::new(MultidiffusionDynamics::new(
                original.clone(),
                config.num_views,
                PredictionFuser::new(config.pose_fields.clone()),
                observer,
            )),
        };
        generator.install_dynamics(wrapper);

        event!(
            target: "multiview::session",
            Level::INFO,
            mode = mode.as_str(),
            num_views = config.num_views as u64,
            num_steps = config.num_steps as u64,
            "multi-view dynamics installed"
        );

        Ok(Self {
            generator,
            original: Some(original),
            mode,
        })
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// End the session now instead of at scope exit.
    pub fn end(self) {}

    fn restore(&mut self) {
        if let Some(original) = self.original.take() {
            self.generator.install_dynamics(original);
            event!(
                target: "multiview::session",
                Level::DEBUG,
                mode = self.mode.as_str(),
                "original dynamics restored"
            );
        }
    }
}

impl<G: Generator + ?Sized> Deref for MultiViewSession<'_, G> {
    type Target = G;

    fn deref(&self) -> &G {
        &*self.generator
    }
}

impl<G: Generator + ?Sized> DerefMut for MultiViewSession<'_, G> {
    fn deref_mut(&mut self) -> &mut G {
        &mut *self.generator
    }
}

impl<G: Generator + ?Sized> Drop for MultiViewSession<'_, G> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Run `body` with multi-view dynamics installed on `generator`.
pub fn with_multi_view<G, R, F>(
    generator: &mut G,
    config: &MultiViewConfig,
    observer: Option<Box<dyn ViewObserver>>,
    body: F,
) -> Result<R, ConfigError>
where
    G: Generator + ?Sized,
    F: FnOnce(&mut G) -> R,
{
    let mut session = MultiViewSession::begin(generator, config, observer)?;
    Ok(body(&mut *session))
}
