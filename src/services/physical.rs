//! Physical stop button handling.
//!
//! A pressed button has the same effect as `GET /stop`: it sets the
//! cancellation signal, and with no run active it idles the outputs.
//!
//! # Usage
//!
//! ```ignore
//! use rs_washcycle::services::{InputStopButton, StopButtonHandler};
//!
//! let button = InputStopButton::new(Arc::clone(&sequencer), ChannelId(16));
//! let mut handler = StopButtonHandler::new(Arc::clone(&sequencer), button);
//!
//! // In your poll loop:
//! handler.poll();
//! ```

use std::sync::Arc;

use tracing::{error, warn};

use crate::traits::{ChannelId, HardwarePort, Level, StopButton};

use super::shared::{SequenceProvider, SharedSequencer};

/// Polls a stop button and aborts through the provider on each press.
pub struct StopButtonHandler<S: SequenceProvider, B: StopButton> {
    provider: S,
    button: B,
}

impl<S: SequenceProvider, B: StopButton> StopButtonHandler<S, B> {
    /// Create a new handler.
    pub fn new(provider: S, button: B) -> Self {
        Self { provider, button }
    }

    /// Check the button once.
    ///
    /// Call this frequently (e.g., every 10-20ms) in your poll loop.
    /// Returns `true` if a press was seen.
    pub fn poll(&mut self) -> bool {
        if !self.button.just_pressed() {
            return false;
        }

        warn!("stop button pressed");
        if let Err(err) = self.provider.abort() {
            error!(error = %err, "stop button could not reach safe state");
        }
        true
    }

    /// Get a reference to the button.
    pub fn button(&self) -> &B {
        &self.button
    }

    /// Get a mutable reference to the button.
    pub fn button_mut(&mut self) -> &mut B {
        &mut self.button
    }
}

/// Rising-edge detector over a digital input read through the shared port.
pub struct InputStopButton<P: HardwarePort> {
    sequencer: Arc<SharedSequencer<P>>,
    channel: ChannelId,
    last: Level,
}

impl<P: HardwarePort> InputStopButton<P> {
    /// Watch `channel`. The input is assumed released at start.
    pub fn new(sequencer: Arc<SharedSequencer<P>>, channel: ChannelId) -> Self {
        Self {
            sequencer,
            channel,
            last: Level::Low,
        }
    }

    /// Channel being watched.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl<P: HardwarePort> StopButton for InputStopButton<P> {
    fn just_pressed(&mut self) -> bool {
        let channel = self.channel;
        let level = match self.sequencer.with_port(|port| port.read_digital(channel)) {
            Ok(level) => level,
            Err(err) => {
                error!(%channel, error = %err, "stop button read failed");
                return false;
            }
        };

        let rising = !self.last.is_high() && level.is_high();
        self.last = level;
        rising
    }
}
