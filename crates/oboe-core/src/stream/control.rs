//! Per-stream control thread
//!
//! The device handle lives on this thread for the whole life of the stream
//! (CPAL streams cannot move between threads). The thread opens the device,
//! hands the stream its binding, then resumes and pauses the device as the
//! stream state asks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};

use crate::audio::{self, BackendKind, EndpointHandle, StreamRequest};
use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};

use super::callback::{mark_disconnected, StreamBinding};
use super::shared::StreamShared;

/// Messages to a stream's control thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// A request needs the callback running to complete
    Wake,
    /// The callback reached a resting state
    Quiesced,
    /// Stop the device and exit
    Close,
}

/// Queue depth for control messages
const CONTROL_QUEUE: usize = 32;

/// An open device and the thread that owns it
pub struct ControlThread {
    pub sender: Sender<ControlMessage>,
    pub handle: JoinHandle<()>,
    pub backend: BackendKind,
}

/// Spawn the control thread and open the device on it
///
/// Blocks until the device is open (or failed to open).
pub fn spawn(
    preference: BackendKind,
    request: StreamRequest,
    config: OboeConfig,
) -> OboeResult<(ControlThread, StreamBinding)> {
    let (sender, receiver) = bounded::<ControlMessage>(CONTROL_QUEUE);
    let (reply_tx, reply_rx) = bounded::<OboeResult<(BackendKind, StreamBinding)>>(1);
    let callback_sender = sender.clone();

    let handle = thread::Builder::new()
        .name("oboe-ctl".to_string())
        .spawn(move || {
            match audio::open_endpoint(preference, &request, &config, &callback_sender) {
                Ok((endpoint, binding)) => {
                    let shared = binding.shared.clone();
                    let kind = endpoint.kind();
                    if reply_tx.send(Ok((kind, binding))).is_err() {
                        return;
                    }
                    run(endpoint, receiver, shared);
                }
                Err(e) => {
                    let _ = reply_tx.send(Err(e));
                }
            }
        })
        .map_err(|e| OboeError::Unavailable(format!("failed to spawn control thread: {}", e)))?;

    match reply_rx.recv() {
        Ok(Ok((backend, binding))) => Ok((ControlThread { sender, handle, backend }, binding)),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(OboeError::Internal("control thread exited during open".to_string()))
        }
    }
}

fn run(
    mut endpoint: EndpointHandle,
    receiver: Receiver<ControlMessage>,
    shared: Arc<StreamShared>,
) {
    let mut running = false;

    while let Ok(message) = receiver.recv() {
        match message {
            ControlMessage::Wake => {
                if !running {
                    match endpoint.resume() {
                        Ok(()) => running = true,
                        Err(e) => {
                            log::error!(
                                "Failed to start {} device: {}",
                                shared.geometry.direction,
                                e
                            );
                            mark_disconnected(&shared);
                        }
                    }
                }
            }
            ControlMessage::Quiesced => {
                // Re-check: a new request may have arrived since the callback settled
                if running && shared.state.load().is_quiescent() {
                    if let Err(e) = endpoint.pause() {
                        log::warn!("Failed to pause {} device: {}", shared.geometry.direction, e);
                    } else {
                        running = false;
                    }
                }
            }
            ControlMessage::Close => break,
        }
    }

    if running {
        if let Err(e) = endpoint.pause() {
            log::debug!("Pause on close failed: {}", e);
        }
    }
    drop(endpoint);
    log::debug!("{} control thread exiting", shared.geometry.direction);
}
