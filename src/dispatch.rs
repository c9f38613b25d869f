//! Outbound command lifecycle.
//!
//! One FIFO queue; only the head task is ever on the wire. Each dispatch
//! tick sends the head packet, waits the pacing interval, and drops the
//! task once its attempts are spent. Inbound frames are matched against the
//! head task only; a match (family overview byte or the generic ack)
//! terminates the retry cycle. Commands are serviced strictly in submission
//! order; a later command never overtakes an earlier one, even while the
//! earlier one is retrying.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

use crate::{
    codec::BuiltCommand,
    constants::{DISPATCH_INTERVAL, MAX_SEND_ATTEMPTS},
    device::{CommandValue, DeviceSubType, DeviceType},
    error::Error,
    message::RawFrame,
};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Pause between transmissions of the head task.
    pub interval: Duration,
    /// Transmissions per task before it is dropped.
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: DISPATCH_INTERVAL,
            max_attempts: MAX_SEND_ATTEMPTS,
        }
    }
}

#[derive(Debug)]
pub struct CommandTask {
    pub id: u64,
    pub attempt: u32,
    pub device_type: DeviceType,
    pub room_id: u8,
    pub pos_id: u8,
    pub sub_type: DeviceSubType,
    pub requested_value: CommandValue,
    pub built: BuiltCommand,
    /// The frame that acknowledged this task, once one matched.
    pub ack: Option<RawFrame>,
}

/// Terminal result of a command, reported to the host layer.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Acked,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct CommandReport {
    pub id: u64,
    pub device_type: DeviceType,
    pub room_id: u8,
    pub pos_id: u8,
    pub requested_value: CommandValue,
    pub attempts: u32,
    pub outcome: CommandOutcome,
}

#[derive(Debug)]
pub struct Dispatcher {
    queue: Mutex<VecDeque<CommandTask>>,
    wake: Notify,
    config: DispatchConfig,
    next_id: AtomicU64,
    reports: mpsc::UnboundedSender<CommandReport>,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> (Self, mpsc::UnboundedReceiver<CommandReport>) {
        let (reports, reports_rx) = mpsc::unbounded_channel();
        (
            Self {
                queue: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                config,
                next_id: AtomicU64::new(1),
                reports,
            },
            reports_rx,
        )
    }

    /// Enqueue a command. Never blocks; the dispatch loop is woken if it
    /// was idle. Returns the task id.
    pub fn submit(
        &self,
        device_type: DeviceType,
        room_id: u8,
        pos_id: u8,
        sub_type: DeviceSubType,
        requested_value: CommandValue,
        built: BuiltCommand,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = CommandTask {
            id,
            attempt: 0,
            device_type,
            room_id,
            pos_id,
            sub_type,
            requested_value,
            built,
            ack: None,
        };
        debug!(id, ?device_type, room_id, pos_id, "command queued");
        self.queue
            .lock()
            .expect("dispatcher queue poisoned")
            .push_back(task);
        self.wake.notify_one();
        id
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().expect("dispatcher queue poisoned").len()
    }

    /// Match an inbound frame against the head task. Called from the
    /// inbound loop for every verified frame while a command is in flight.
    pub fn handle_frame(&self, frame: &RawFrame) {
        let mut queue = self.queue.lock().expect("dispatcher queue poisoned");
        let Some(head) = queue.front_mut() else {
            return;
        };
        // A queued-but-never-sent task cannot have been acknowledged.
        if head.attempt == 0 || !head.built.is_acked_by(frame) {
            return;
        }
        head.ack = Some(frame.clone());
        let task = queue.pop_front().expect("head vanished");
        drop(queue);
        debug!(id = task.id, attempts = task.attempt, "command acked");
        self.report(task, CommandOutcome::Acked);
        self.wake.notify_one();
    }

    /// Dispatch loop: runs for the lifetime of a connection session and
    /// returns when the packet channel closes (connection teardown). The
    /// queue survives across sessions, so unacknowledged commands keep
    /// retrying on a fresh connection.
    pub async fn run(&self, packet_tx: mpsc::Sender<Vec<u8>>) {
        loop {
            // Park until there is a head task to service.
            let notified = self.wake.notified();
            if self.pending() == 0 {
                notified.await;
                continue;
            }

            let Some((id, packet)) = self.begin_attempt() else {
                continue;
            };
            if packet_tx.send(packet).await.is_err() {
                return;
            }

            tokio::time::sleep(self.config.interval).await;
            self.expire_if_spent(id);
        }
    }

    /// Increment the head task's attempt counter and take its packet.
    /// A head task that already spent its attempts is dropped instead of
    /// sent; the dispatch loop may be restarted mid-pacing (connection
    /// loss), and a restart must not buy the task an extra transmission.
    fn begin_attempt(&self) -> Option<(u64, Vec<u8>)> {
        let mut queue = self.queue.lock().expect("dispatcher queue poisoned");
        if matches!(
            queue.front(),
            Some(head) if head.attempt >= self.config.max_attempts
        ) {
            let task = queue.pop_front().expect("head vanished");
            drop(queue);
            self.drop_task(task);
            return None;
        }
        let head = queue.front_mut()?;
        head.attempt += 1;
        debug!(
            id = head.id,
            attempt = head.attempt,
            packet = %hex::encode(head.built.frame.as_slice()),
            "transmitting command"
        );
        Some((head.id, head.built.frame.to_vec()))
    }

    /// Drop the head task if it is still the one we just sent and its
    /// attempts are spent without an ack.
    fn expire_if_spent(&self, id: u64) {
        let mut queue = self.queue.lock().expect("dispatcher queue poisoned");
        let spent = matches!(
            queue.front(),
            Some(head) if head.id == id && head.attempt >= self.config.max_attempts
        );
        if !spent {
            return;
        }
        let task = queue.pop_front().expect("head vanished");
        drop(queue);
        self.drop_task(task);
    }

    fn drop_task(&self, task: CommandTask) {
        warn!(
            id = task.id,
            error = %Error::CommandExhausted { attempts: task.attempt },
            device = ?task.device_type,
            "command dropped"
        );
        self.report(task, CommandOutcome::Dropped);
    }

    fn report(&self, task: CommandTask, outcome: CommandOutcome) {
        // The host layer may not listen for reports; that is fine.
        let _ = self.reports.send(CommandReport {
            id: task.id,
            device_type: task.device_type,
            room_id: task.room_id,
            pos_id: task.pos_id,
            requested_value: task.requested_value,
            attempts: task.attempt,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec, detect::HardwareGeneration, message::{frame_template, seal}};
    use std::sync::Arc;

    fn light_command(room: u8, idx: u8) -> BuiltCommand {
        codec::build(
            DeviceType::Light,
            room,
            idx,
            DeviceSubType::None,
            &CommandValue::Switch(true),
            HardwareGeneration::General,
        )
        .unwrap()
    }

    fn submit_light(dispatcher: &Dispatcher, room: u8, idx: u8) -> u64 {
        dispatcher.submit(
            DeviceType::Light,
            room,
            idx,
            DeviceSubType::None,
            CommandValue::Switch(true),
            light_command(room, idx),
        )
    }

    fn control_ack() -> crate::message::RawFrame {
        let mut bytes = frame_template(0x31, 14).unwrap();
        bytes[3] = 0x92;
        seal(bytes)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let (dispatcher, mut reports) = Dispatcher::new(DispatchConfig {
            interval: Duration::from_millis(100),
            max_attempts: 3,
        });
        let dispatcher = Arc::new(dispatcher);
        let (tx, mut rx) = mpsc::channel(8);

        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(tx).await })
        };
        submit_light(&dispatcher, 1, 0);

        // Exactly three transmissions, then silence.
        for _ in 0..3 {
            assert!(rx.recv().await.is_some());
        }
        let report = reports.recv().await.unwrap();
        assert_eq!(report.outcome, CommandOutcome::Dropped);
        assert_eq!(report.attempts, 3);
        assert_eq!(dispatcher.pending(), 0);

        // No fourth transmission ever arrives.
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect_err("unexpected extra transmission");
        runner.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_terminates_retries() {
        let (dispatcher, mut reports) = Dispatcher::new(DispatchConfig {
            interval: Duration::from_millis(100),
            max_attempts: 5,
        });
        let dispatcher = Arc::new(dispatcher);
        let (tx, mut rx) = mpsc::channel(8);
        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(tx).await })
        };

        submit_light(&dispatcher, 1, 0);
        assert!(rx.recv().await.is_some());
        dispatcher.handle_frame(&control_ack());

        let report = reports.recv().await.unwrap();
        assert_eq!(report.outcome, CommandOutcome::Acked);
        assert_eq!(report.attempts, 1);
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect_err("retried after ack");
        runner.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_does_not_exceed_retry_bound() {
        let (dispatcher, mut reports) = Dispatcher::new(DispatchConfig {
            interval: Duration::from_secs(3600),
            max_attempts: 1,
        });
        let dispatcher = Arc::new(dispatcher);
        submit_light(&dispatcher, 1, 0);

        let (tx, mut rx) = mpsc::channel(8);
        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(tx).await })
        };
        assert!(rx.recv().await.is_some());
        // Connection loss during the pacing sleep of the final attempt.
        runner.abort();

        let (tx, mut rx) = mpsc::channel(8);
        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(tx).await })
        };

        // The fresh session drops the spent task instead of resending it.
        let report = reports.recv().await.unwrap();
        assert_eq!(report.outcome, CommandOutcome::Dropped);
        assert_eq!(report.attempts, 1);
        assert_eq!(dispatcher.pending(), 0);
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect_err("spent task was retransmitted after restart");
        runner.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_submission_order() {
        let (dispatcher, mut reports) = Dispatcher::new(DispatchConfig {
            interval: Duration::from_millis(100),
            max_attempts: 2,
        });
        let dispatcher = Arc::new(dispatcher);
        let (tx, mut rx) = mpsc::channel(8);
        let runner = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run(tx).await })
        };

        submit_light(&dispatcher, 1, 0);
        submit_light(&dispatcher, 2, 0);
        let first = light_command(1, 0).frame.to_vec();
        let second = light_command(2, 0).frame.to_vec();

        // Both attempts of the first command come before any of the second.
        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(reports.recv().await.unwrap().outcome, CommandOutcome::Dropped);
        assert_eq!(rx.recv().await.unwrap(), second);
        assert_eq!(rx.recv().await.unwrap(), second);
        runner.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsent_task_cannot_be_acked() {
        let (dispatcher, mut reports) = Dispatcher::new(DispatchConfig::default());
        submit_light(&dispatcher, 1, 0);
        // No dispatch loop has run, so the ack must not match.
        dispatcher.handle_frame(&control_ack());
        assert_eq!(dispatcher.pending(), 1);
        assert!(reports.try_recv().is_err());
    }
}
