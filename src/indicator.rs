//! Liveness/peripheral task
//!
//! Runs independently of the update coordinator and proves the core never
//! monopolizes the device: directives parsed from the control channel drive
//! a status indicator (an LED on real hardware) no matter what state the
//! update machinery is in. The only coupling is the scheduler.

use crate::protocol::messages::DeviceDirective;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Something that can show a binary on/off state
pub trait StatusIndicator: Send {
    fn set(&mut self, on: bool);
}

/// Log-backed indicator used off-hardware
#[derive(Debug, Default)]
pub struct LogIndicator {
    on: bool,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl StatusIndicator for LogIndicator {
    fn set(&mut self, on: bool) {
        self.on = on;
        info!("Status indicator turned {}", if on { "on" } else { "off" });
    }
}

/// Run the indicator task until the directive channel closes
pub async fn run_indicator(
    mut indicator: impl StatusIndicator,
    mut directives: mpsc::Receiver<DeviceDirective>,
) {
    info!("Liveness task started");
    while let Some(directive) = directives.recv().await {
        match directive {
            DeviceDirective::On => indicator.set(true),
            DeviceDirective::Off => indicator.set(false),
        }
    }
    debug!("Directive channel closed, liveness task stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingIndicator {
        states: Arc<Mutex<Vec<bool>>>,
    }

    impl StatusIndicator for RecordingIndicator {
        fn set(&mut self, on: bool) {
            self.states.lock().unwrap().push(on);
        }
    }

    #[tokio::test]
    async fn test_directives_drive_indicator() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let indicator = RecordingIndicator {
            states: states.clone(),
        };
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(run_indicator(indicator, rx));

        tx.send(DeviceDirective::On).await.unwrap();
        tx.send(DeviceDirective::Off).await.unwrap();
        tx.send(DeviceDirective::On).await.unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(*states.lock().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_log_indicator_tracks_state() {
        let mut indicator = LogIndicator::new();
        assert!(!indicator.is_on());
        indicator.set(true);
        assert!(indicator.is_on());
        indicator.set(false);
        assert!(!indicator.is_on());
    }
}
