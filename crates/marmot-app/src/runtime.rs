//! [`Runtime`]: the generic orchestration loop pairing a [`crate::Driver`]
//! with a [`crate::Controller`].
//!
//! The controller is sans-IO; the runtime is where its returned
//! [`ControllerAction`]s actually become driver calls, and where driver
//! input actually becomes controller calls. Swapping the driver (production
//! QUIC + relay vs. `marmot-harness`'s simulated one) changes none of this.

use std::time::Duration;

use marmot_core::{env::Environment, identity::Identity};

use crate::{
    action::ControllerAction,
    config::SessionConfig,
    controller::Controller,
    driver::Driver,
    input::Input,
    op::Operation,
};

/// Default cadence for the driver-sleep fallback when no input is ready.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Orchestrates a [`Driver`] and a [`Controller`] in lockstep: poll for
/// input, hand it to the controller, execute whatever actions come back.
pub struct Runtime<D: Driver, E: Environment> {
    driver: D,
    controller: Controller<E>,
    tick_interval: Duration,
}

impl<D: Driver, E: Environment> Runtime<D, E> {
    /// A runtime for `driver`, with a fresh controller for `identity`.
    #[must_use]
    pub fn new(driver: D, env: E, identity: Identity) -> Self {
        Self { driver, controller: Controller::new(env, identity), tick_interval: DEFAULT_TICK_INTERVAL }
    }

    /// Override the tick cadence used when the driver has no input ready.
    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Read-only access to the controller, e.g. for a host polling
    /// [`Controller::snapshot`] instead of consuming events.
    #[must_use]
    pub fn controller(&self) -> &Controller<E> {
        &self.controller
    }

    /// Submit a host operation (e.g. [`Operation::Bootstrap`]) and execute
    /// the resulting actions immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to execute a resulting action.
    pub async fn submit(&mut self, op: Operation) -> Result<(), D::Error> {
        let actions = self.controller.handle_operation(op);
        self.process_actions(actions).await
    }

    /// Convenience wrapper over [`Runtime::submit`] for the common first
    /// call: start the bootstrap handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to execute a resulting action.
    pub async fn bootstrap(&mut self, config: SessionConfig) -> Result<(), D::Error> {
        self.submit(Operation::Bootstrap(config)).await
    }

    /// Run the main loop until [`Operation::Shutdown`] is submitted: poll
    /// the driver for input, drive the controller, execute its actions,
    /// falling back to a timed [`Input::Tick`] when nothing is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn run(mut self) -> Result<(), D::Error> {
        while !self.controller.is_shutdown() {
            self.step().await?;
        }
        self.driver.close_transport();
        Ok(())
    }

    /// Process one iteration of the event loop: poll once, drive the
    /// controller with whatever arrived (or a tick, if nothing did).
    ///
    /// # Errors
    ///
    /// Returns an error if the driver encounters an I/O error.
    pub async fn step(&mut self) -> Result<(), D::Error> {
        match self.driver.poll_input().await? {
            Some(input) => {
                let actions = self.controller.handle_input(input);
                self.process_actions(actions).await
            },
            None => {
                self.driver.sleep(self.tick_interval).await;
                let actions = self.controller.handle_input(Input::Tick);
                self.process_actions(actions).await
            },
        }
    }

    async fn process_actions(&mut self, actions: Vec<ControllerAction>) -> Result<(), D::Error> {
        for action in actions {
            match action {
                ControllerAction::PublishEnvelope(event) => self.driver.publish_envelope(event).await?,
                ControllerAction::OpenTransport { group_root, own_pubkey_hex } => {
                    self.driver.open_transport(group_root, own_pubkey_hex).await?;
                },
                ControllerAction::PublishWrapper(bytes) => self.driver.publish_wrapper(bytes).await?,
                ControllerAction::SubscribePeer(pubkey) => self.driver.subscribe_peer(pubkey).await?,
                ControllerAction::CloseTransport => self.driver.close_transport(),
                ControllerAction::Emit(event) => self.driver.emit(event),
            }
        }
        Ok(())
    }
}
