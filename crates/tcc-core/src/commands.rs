//! Command dispatcher for liquid-cooler writes.
//!
//! A [`Command`] is a typed write (LED, fan or pump setting). The
//! [`CommandDispatcher`] applies it through a [`Session`] and reports a
//! [`CommandOutcome`]; it never returns an error and never panics.
//!
//! Commands are only issued while the session is connected. Outside of that
//! they are rejected immediately as [`CommandOutcome::NotConnected`] and never
//! reach the transport; there is no queue. Switching a component off is its
//! own remote call and is not the same as setting a zero duty cycle.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use tcc_types::{MAX_DUTY_CYCLE, Rgb};

use crate::aquaris::methods;
use crate::error::{Error, Result};
use crate::events::SessionEvent;
use crate::session::{ConnectionState, Session};
use crate::transport::Value;

/// A write to a liquid-cooling device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Turn the LED on with a color and animation mode.
    SetLed { color: Rgb, mode: u8 },
    /// Turn the LED off.
    LedOff,
    /// Turn the fan on at a duty cycle (0-100).
    SetFan { duty_cycle: u8 },
    /// Turn the fan off.
    FanOff,
    /// Turn the pump on at a duty cycle (0-100) and voltage setting.
    SetPump { duty_cycle: u8, voltage: u8 },
    /// Turn the pump off.
    PumpOff,
}

impl Command {
    /// LED command for a toggle: on with `color` and `mode`, or off.
    pub fn led(on: bool, color: Rgb, mode: u8) -> Self {
        if on {
            Command::SetLed { color, mode }
        } else {
            Command::LedOff
        }
    }

    /// Fan command for a toggle: on at `duty_cycle`, or off.
    pub fn fan(on: bool, duty_cycle: u8) -> Self {
        if on {
            Command::SetFan { duty_cycle }
        } else {
            Command::FanOff
        }
    }

    /// Pump command for a toggle: on at `duty_cycle` and `voltage`, or off.
    pub fn pump(on: bool, duty_cycle: u8, voltage: u8) -> Self {
        if on {
            Command::SetPump {
                duty_cycle,
                voltage,
            }
        } else {
            Command::PumpOff
        }
    }

    /// Remote method implementing this command.
    pub fn method(&self) -> &'static str {
        match self {
            Command::SetLed { .. } => methods::UPDATE_LED,
            Command::LedOff => methods::WRITE_RGB_OFF,
            Command::SetFan { .. } => methods::WRITE_FAN_MODE,
            Command::FanOff => methods::WRITE_FAN_OFF,
            Command::SetPump { .. } => methods::WRITE_PUMP_MODE,
            Command::PumpOff => methods::WRITE_PUMP_OFF,
        }
    }

    /// Positional arguments for [`method`](Self::method).
    pub fn args(&self) -> Vec<Value> {
        match *self {
            Command::SetLed { color, mode } => {
                vec![json!(color.red), json!(color.green), json!(color.blue), json!(mode)]
            }
            Command::SetFan { duty_cycle } => vec![json!(duty_cycle)],
            Command::SetPump {
                duty_cycle,
                voltage,
            } => vec![json!(duty_cycle), json!(voltage)],
            Command::LedOff | Command::FanOff | Command::PumpOff => Vec::new(),
        }
    }

    /// Check arguments before anything is sent.
    pub fn validate(&self) -> Result<()> {
        let duty = match *self {
            Command::SetFan { duty_cycle } | Command::SetPump { duty_cycle, .. } => duty_cycle,
            _ => return Ok(()),
        };
        if duty > MAX_DUTY_CYCLE {
            return Err(Error::InvalidArgument(format!(
                "duty cycle {} exceeds {}",
                duty, MAX_DUTY_CYCLE
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetLed { color, mode } => write!(f, "led {} mode {}", color, mode),
            Command::LedOff => write!(f, "led off"),
            Command::SetFan { duty_cycle } => write!(f, "fan {}%", duty_cycle),
            Command::FanOff => write!(f, "fan off"),
            Command::SetPump {
                duty_cycle,
                voltage,
            } => write!(f, "pump {}% voltage {}", duty_cycle, voltage),
            Command::PumpOff => write!(f, "pump off"),
        }
    }
}

/// Result of dispatching a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The device accepted the command.
    Applied,
    /// Rejected locally: the session is not connected. Nothing was sent.
    NotConnected,
    /// Rejected locally: invalid arguments. Nothing was sent.
    Invalid(String),
    /// Sent, but the call failed or the device refused it.
    Failed(String),
}

impl CommandOutcome {
    /// Whether the command was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, CommandOutcome::Applied)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Applied => write!(f, "applied"),
            CommandOutcome::NotConnected => write!(f, "not connected"),
            CommandOutcome::Invalid(reason) => write!(f, "invalid: {}", reason),
            CommandOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Applies commands through a session.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    session: Arc<Session>,
}

impl CommandDispatcher {
    /// Create a dispatcher on `session`.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Apply `command` exactly once.
    ///
    /// A failed call is logged and reported as [`CommandOutcome::Failed`];
    /// it does not change the connection state (only a lost transport
    /// does, as for any call). An explicit `false` result from the device
    /// counts as a failure.
    pub async fn dispatch(&self, command: Command) -> CommandOutcome {
        if self.session.state() != ConnectionState::Connected {
            debug!("Dropping {}: not connected", command);
            return CommandOutcome::NotConnected;
        }
        if let Err(e) = command.validate() {
            return CommandOutcome::Invalid(e.to_string());
        }

        match self.session.call(command.method(), &command.args()).await {
            Ok(Value::Bool(false)) => self.failed(command, "rejected by device".to_string()),
            Ok(_) => {
                debug!("Applied {}", command);
                CommandOutcome::Applied
            }
            Err(Error::NotConnected) => CommandOutcome::NotConnected,
            Err(e) => self.failed(command, e.to_string()),
        }
    }

    fn failed(&self, command: Command, error: String) -> CommandOutcome {
        warn!("Command {} failed: {}", command, error);
        self.session.events().send(SessionEvent::CommandFailed {
            command: command.to_string(),
            error: error.clone(),
        });
        CommandOutcome::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn setup() -> (MockTransport, Arc<Session>, CommandDispatcher) {
        let transport = MockTransport::with_handler(|_, _| Ok(Value::Null));
        let session = Arc::new(Session::new(Arc::new(transport.clone())));
        let dispatcher = CommandDispatcher::new(Arc::clone(&session));
        (transport, session, dispatcher)
    }

    #[test]
    fn test_command_wire_mapping() {
        let led = Command::SetLed {
            color: Rgb::new(255, 0, 0),
            mode: 1,
        };
        assert_eq!(led.method(), "updateLED");
        assert_eq!(led.args(), vec![json!(255), json!(0), json!(0), json!(1)]);

        assert_eq!(Command::FanOff.method(), "writeFanOff");
        assert!(Command::FanOff.args().is_empty());
        assert_eq!(
            Command::SetFan { duty_cycle: 0 }.method(),
            "writeFanMode",
            "zero duty is a mode write, not an off"
        );

        let pump = Command::SetPump {
            duty_cycle: 60,
            voltage: 2,
        };
        assert_eq!(pump.method(), "writePumpMode");
        assert_eq!(pump.args(), vec![json!(60), json!(2)]);
        assert_eq!(Command::LedOff.method(), "writeRGBOff");
        assert_eq!(Command::PumpOff.method(), "writePumpOff");
    }

    #[test]
    fn test_toggle_constructors() {
        assert_eq!(Command::fan(false, 80), Command::FanOff);
        assert_eq!(Command::fan(true, 80), Command::SetFan { duty_cycle: 80 });
        assert_eq!(Command::led(false, Rgb::WHITE, 0), Command::LedOff);
        assert_eq!(
            Command::pump(true, 50, 1),
            Command::SetPump {
                duty_cycle: 50,
                voltage: 1
            }
        );
    }

    #[test]
    fn test_validation() {
        assert!(Command::SetFan { duty_cycle: 100 }.validate().is_ok());
        assert!(Command::SetFan { duty_cycle: 101 }.validate().is_err());
        assert!(
            Command::SetPump {
                duty_cycle: 200,
                voltage: 0
            }
            .validate()
            .is_err()
        );
        assert!(Command::LedOff.validate().is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_when_disconnected_never_calls_transport() {
        let (transport, _session, dispatcher) = setup();

        let outcome = dispatcher.dispatch(Command::SetFan { duty_cycle: 50 }).await;
        assert_eq!(outcome, CommandOutcome::NotConnected);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_applies_once() {
        let (transport, session, dispatcher) = setup();
        session.connect("a").await.unwrap();

        let outcome = dispatcher.dispatch(Command::FanOff).await;
        assert!(outcome.is_applied());
        assert_eq!(transport.calls_to("writeFanOff"), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_command_not_sent() {
        let (transport, session, dispatcher) = setup();
        session.connect("a").await.unwrap();

        let outcome = dispatcher.dispatch(Command::SetFan { duty_cycle: 150 }).await;
        assert!(matches!(outcome, CommandOutcome::Invalid(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_command_keeps_connection() {
        let (transport, session, dispatcher) = setup();
        session.connect("a").await.unwrap();
        let mut events = session.subscribe();
        transport.fail_method("writePumpOff");

        let outcome = dispatcher.dispatch(Command::PumpOff).await;
        assert!(matches!(outcome, CommandOutcome::Failed(_)));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::CommandFailed { .. }
        ));

        // No retry behind the caller's back
        assert_eq!(transport.calls_to("writePumpOff"), 1);
    }

    #[tokio::test]
    async fn test_explicit_false_is_failure() {
        let transport = MockTransport::with_handler(|_, _| Ok(Value::Bool(false)));
        let session = Arc::new(Session::new(Arc::new(transport.clone())));
        let dispatcher = CommandDispatcher::new(Arc::clone(&session));
        session.connect("a").await.unwrap();

        let outcome = dispatcher.dispatch(Command::LedOff).await;
        assert_eq!(outcome, CommandOutcome::Failed("rejected by device".to_string()));
    }
}
