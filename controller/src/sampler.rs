//! Fixed-rate loop that turns the current stick position into packets.

use crate::controls::ControlState;
use log::debug;
use shared::ServerboundPacket;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns the sampler. It stops on its own once the outbound channel closes.
pub fn spawn_sampler(
    state: Arc<Mutex<ControlState>>,
    outbound: UnboundedSender<ServerboundPacket>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let packets = state.lock().unwrap_or_else(PoisonError::into_inner).tick();
            for packet in packets {
                if outbound.send(packet).is_err() {
                    debug!("Outbound channel closed, stopping sampler");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Axis, ControllerEvent};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_sampler_sends_while_stick_is_held() {
        let state = Arc::new(Mutex::new(ControlState::new()));
        state.lock().unwrap().apply_event(ControllerEvent::Axis {
            axis: Axis::LeftX,
            value: i16::MAX,
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_sampler(Arc::clone(&state), tx, Duration::from_millis(1));

        for _ in 0..3 {
            let packet = timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("sampler stalled")
                .expect("channel closed");
            assert!(matches!(packet, ServerboundPacket::Move { .. }));
        }

        drop(rx);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("sampler did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sampler_is_quiet_when_idle() {
        let state = Arc::new(Mutex::new(ControlState::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_sampler(state, tx, Duration::from_millis(1));

        assert!(timeout(Duration::from_millis(20), rx.recv()).await.is_err());
        handle.abort();
    }
}
