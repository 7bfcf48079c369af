use std::{fmt::Display, sync::Arc};

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::engine::{Context, Engine};

/// The runtime handle effects are run with.
///
/// A service context is obtained from
/// [`Mounted::service_context`](crate::engine::Mounted::service_context). A
/// context created with [`missing`](Self::missing) stands for code running
/// before the engine was mounted; running an effect with it is a setup bug
/// and panics.
pub struct ServiceContext<E> {
    engine: Option<Arc<Engine<E>>>,
}

impl<E> Clone for ServiceContext<E> {
    fn clone(&self) -> Self { Self { engine: self.engine.clone() } }
}

impl<E> Default for ServiceContext<E> {
    fn default() -> Self { Self::missing() }
}

impl<E> std::fmt::Debug for ServiceContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("provided", &self.engine.is_some())
            .finish()
    }
}

impl<E> ServiceContext<E> {
    /// A context whose engine was never mounted.
    #[must_use]
    pub const fn missing() -> Self { Self { engine: None } }

    pub(super) const fn provided(engine: Arc<Engine<E>>) -> Self {
        Self { engine: Some(engine) }
    }

    /// Returns `true` if an engine is available.
    #[must_use]
    pub const fn is_provided(&self) -> bool { self.engine.is_some() }
}

impl<E: Send + Sync + 'static> ServiceContext<E> {
    /// Returns the query context of the mounted engine.
    ///
    /// # Panics
    ///
    /// Panics if the engine was never mounted.
    #[must_use]
    pub fn provide(&self) -> Context<E> {
        match &self.engine {
            Some(engine) => engine.context(),
            None => panic!(
                "service context not provided, mount the engine before \
                 running effects"
            ),
        }
    }

    /// Spawns `effect` with the query context of the mounted engine.
    ///
    /// # Panics
    ///
    /// Panics if the engine was never mounted.
    pub fn run<F, Fut>(&self, effect: F) -> EffectHandle<Fut::Output>
    where
        F: FnOnce(Context<E>) -> Fut,
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        let context = self.provide();

        EffectHandle { task: tokio::spawn(effect(context).in_current_span()) }
    }

    /// Like [`run`](Self::run), but logs the error of a failed effect instead
    /// of returning it.
    ///
    /// # Panics
    ///
    /// Panics if the engine was never mounted.
    pub fn run_with_error_log<F, Fut, T, Err>(
        &self,
        effect: F,
    ) -> EffectHandle<Option<T>>
    where
        F: FnOnce(Context<E>) -> Fut,
        Fut: Future<Output = Result<T, Err>> + Send + 'static,
        T: Send + 'static,
        Err: Display + Send + 'static,
    {
        let context = self.provide();
        let effect = effect(context);

        let task = tokio::spawn(
            async move {
                match effect.await {
                    Ok(value) => Some(value),
                    Err(error) => {
                        tracing::error!(%error, "effect failed");
                        None
                    }
                }
            }
            .in_current_span(),
        );

        EffectHandle { task }
    }
}

/// A running effect. Dropping the handle aborts the effect.
#[derive(Debug)]
#[must_use = "dropping the handle aborts the effect"]
pub struct EffectHandle<T> {
    task: JoinHandle<T>,
}

impl<T> EffectHandle<T> {
    /// Waits for the effect to finish.
    ///
    /// Returns `None` if the effect panicked.
    pub async fn wait(mut self) -> Option<T> {
        match (&mut self.task).await {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(%error, "effect did not complete");
                None
            }
        }
    }

    /// Returns `true` if the effect has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.task.is_finished() }
}

impl<T> Drop for EffectHandle<T> {
    fn drop(&mut self) { self.task.abort(); }
}
