//! Live driver - runs a controller against a real timer source.
//!
//! Multiplexes timer expiries with an external command channel on one task.
//! The controller is only ever touched from this loop, so commands and
//! expiries are serialized without locking.

use replay_core::{Command, PlaybackController, RunMode};
use replay_env::TimerDriver;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// What a live run did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Commands received from the channel
    pub commands: u64,

    /// Expiries handed to the controller
    pub expiries: u64,

    /// Expiries the controller ignored as stale
    pub stale: u64,
}

/// Drives `controller` until the command channel closes.
///
/// With `stop_on_complete`, also stops as soon as playback completes.
pub async fn run<C>(
    controller: &mut PlaybackController<C>,
    mut commands: mpsc::Receiver<Command>,
    stop_on_complete: bool,
) -> DriverReport
where
    C: TimerDriver + Clone,
{
    let clock = controller.clock().clone();
    let mut report = DriverReport::default();

    loop {
        tokio::select! {
            Some(id) = clock.next_expiry(), if clock.pending() > 0 => {
                report.expiries += 1;
                if !controller.fire(id).is_applied() {
                    report.stale += 1;
                }
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("Command channel closed");
                    break;
                };
                report.commands += 1;
                controller.apply(command);
            }
        }

        if stop_on_complete && controller.run_mode() == RunMode::Complete {
            info!("Playback complete");
            break;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::payment_service_outage;
    use replay_core::{PlaybackConfig, Speed};
    use replay_env::{Clock, TokioClock, VirtualClock};
    use std::sync::Arc;
    use std::time::Duration;

    fn config(speed: Speed) -> PlaybackConfig {
        PlaybackConfig {
            initial_speed: speed,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_driver_plays_to_completion_on_virtual_time() {
        let clock = VirtualClock::new();
        let script = Arc::new(payment_service_outage().unwrap());
        let mut controller = PlaybackController::new(script, clock.clone(), config(Speed::NORMAL));

        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::Start).await.unwrap();

        let report = run(&mut controller, rx, true).await;

        assert_eq!(controller.run_mode(), RunMode::Complete);
        assert_eq!(report.commands, 1);
        assert_eq!(report.expiries, 14);
        assert_eq!(report.stale, 0);
        assert_eq!(clock.now(), Duration::from_secs(115));
    }

    #[tokio::test]
    async fn test_driver_stops_when_channel_closes() {
        let clock = VirtualClock::new();
        let script = Arc::new(payment_service_outage().unwrap());
        let mut controller = PlaybackController::new(script, clock, config(Speed::NORMAL));

        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::StepForward).await.unwrap();
        tx.send(Command::StepForward).await.unwrap();
        drop(tx);

        let report = run(&mut controller, rx, false).await;

        assert_eq!(report.commands, 2);
        assert_eq!(report.expiries, 0);
        assert_eq!(controller.state().index, Some(1));
        assert_eq!(controller.run_mode(), RunMode::Paused);
    }

    #[tokio::test]
    async fn test_driver_stops_when_a_command_completes_playback() {
        let clock = VirtualClock::new();
        let script = Arc::new(payment_service_outage().unwrap());
        let last = script.len() - 1;
        let mut controller = PlaybackController::new(script, clock, config(Speed::NORMAL));
        for _ in 0..last {
            controller.step_forward();
        }

        // The sender stays open, so only completion can end the loop
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::StepForward).await.unwrap();

        let report = run(&mut controller, rx, true).await;

        assert_eq!(report.commands, 1);
        assert_eq!(report.expiries, 0);
        assert_eq!(controller.run_mode(), RunMode::Complete);
        assert_eq!(controller.state().index, Some(last));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_on_tokio_clock() {
        let clock = Arc::new(TokioClock::new());
        let script = Arc::new(payment_service_outage().unwrap());
        let mut controller = PlaybackController::new(script, clock, config(Speed::QUINTUPLE));

        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::Start).await.unwrap();

        let started = tokio::time::Instant::now();
        let report = run(&mut controller, rx, true).await;

        assert_eq!(controller.run_mode(), RunMode::Complete);
        assert_eq!(report.expiries, 14);
        assert_eq!(started.elapsed(), Duration::from_secs(23));
        drop(tx);
    }
}
