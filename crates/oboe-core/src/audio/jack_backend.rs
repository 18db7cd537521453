//! JACK audio backend (Linux only)
//!
//! Each stream is its own JACK client with one port per channel. The JACK
//! process callback interleaves port buffers into a preallocated scratch
//! buffer and hands it to the stream's [`CallbackCore`].
//!
//! Sample rate and burst size are dictated by the JACK server; a requested
//! rate that differs is logged and the server rate is used.
//!
//! # Port Names
//!
//! Output ports are `out_1..out_N`, input ports `in_1..in_N`. With
//! `jack_autoconnect` they are wired to the physical system ports in order.

use crossbeam::channel::Sender;
use jack::{AudioIn, AudioOut, Client, ClientOptions, Control, Port, PortFlags, ProcessScope};

use super::backend::{StreamGeometry, StreamRequest};
use crate::config::OboeConfig;
use crate::error::{OboeError, OboeResult};
use crate::stream::{bind, CallbackCore, ControlMessage, StreamBinding};
use crate::types::{Direction, SharingMode, UNSPECIFIED};

/// Largest JACK period we preallocate scratch space for
const MAX_BUFFER_SIZE: usize = 8192;

/// Channel count when the request leaves it open
const DEFAULT_CHANNELS: i32 = 2;

/// JACK client handle. Drop this to deactivate the client.
pub struct JackEndpoint {
    _async_client: jack::AsyncClient<JackNotifications, JackProcessor>,
}

impl JackEndpoint {
    /// The JACK graph runs the process callback continuously; nothing to do
    pub fn resume(&mut self) -> OboeResult<()> {
        Ok(())
    }

    /// Quiescent streams emit silence from the callback while the client stays active
    pub fn pause(&mut self) -> OboeResult<()> {
        Ok(())
    }
}

enum JackPorts {
    Out(Vec<Port<AudioOut>>),
    In(Vec<Port<AudioIn>>),
}

/// JACK process handler - runs in JACK's real-time thread
struct JackProcessor {
    ports: JackPorts,
    core: CallbackCore,
    /// Interleaved scratch buffer (preallocated, never grows)
    scratch: Vec<f32>,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let JackProcessor { ports, core, scratch } = self;
        let n_frames = ps.n_frames() as usize;
        let channels = core.channels();
        let needed = n_frames * channels;

        if needed > scratch.len() {
            // Period larger than preallocated; emit silence rather than allocate
            if let JackPorts::Out(outs) = ports {
                for port in outs.iter_mut() {
                    port.as_mut_slice(ps).fill(0.0);
                }
            }
            return Control::Continue;
        }
        let buffer = &mut scratch[..needed];

        match ports {
            JackPorts::Out(outs) => {
                core.render(buffer);
                for (ch, port) in outs.iter_mut().enumerate() {
                    let out = port.as_mut_slice(ps);
                    for (i, sample) in out.iter_mut().enumerate().take(n_frames) {
                        *sample = buffer[i * channels + ch];
                    }
                }
            }
            JackPorts::In(ins) => {
                for (ch, port) in ins.iter().enumerate() {
                    let input = port.as_slice(ps);
                    for (i, sample) in input.iter().enumerate().take(n_frames) {
                        buffer[i * channels + ch] = *sample;
                    }
                }
                core.capture(buffer);
            }
        }

        Control::Continue
    }
}

/// JACK notification handler
struct JackNotifications;

impl jack::NotificationHandler for JackNotifications {
    fn sample_rate(&mut self, _client: &Client, srate: jack::Frames) -> Control {
        log::info!("JACK sample rate changed to: {}", srate);
        Control::Continue
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

/// Open a JACK client for the request
pub fn open(
    request: &StreamRequest,
    config: &OboeConfig,
    control: Sender<ControlMessage>,
) -> OboeResult<(JackEndpoint, StreamBinding)> {
    let (client, _status) = Client::new(&config.jack_client_name, ClientOptions::NO_START_SERVER)
        .map_err(|e| OboeError::NoService(format!("Failed to create JACK client: {}", e)))?;
    let client_name = client.name().to_string();

    let sample_rate = client.sample_rate() as i32;
    let burst = client.buffer_size() as i32;

    if let Some(requested) = request.sample_rate {
        if requested != sample_rate {
            log::info!("JACK server runs at {}Hz, not {}Hz", sample_rate, requested);
        }
    }
    if request.device_id != UNSPECIFIED {
        log::debug!("JACK ignores device id {}", request.device_id);
    }
    if request.sharing_mode == SharingMode::Exclusive {
        log::info!("JACK clients are shared, EXCLUSIVE downgraded to LEGACY");
    }

    let channels = request.channels_or(DEFAULT_CHANNELS, DEFAULT_CHANNELS);
    let register_error =
        |e: jack::Error| OboeError::Unavailable(format!("Failed to register port: {}", e));
    let (ports, port_names) = match request.direction {
        Direction::Output => {
            let mut ports = Vec::with_capacity(channels as usize);
            for ch in 1..=channels {
                ports.push(
                    client
                        .register_port(&format!("out_{}", ch), AudioOut::default())
                        .map_err(register_error)?,
                );
            }
            let names = ports.iter().filter_map(|p| p.name().ok()).collect::<Vec<_>>();
            (JackPorts::Out(ports), names)
        }
        Direction::Input => {
            let mut ports = Vec::with_capacity(channels as usize);
            for ch in 1..=channels {
                ports.push(
                    client
                        .register_port(&format!("in_{}", ch), AudioIn::default())
                        .map_err(register_error)?,
                );
            }
            let names = ports.iter().filter_map(|p| p.name().ok()).collect::<Vec<_>>();
            (JackPorts::In(ports), names)
        }
    };

    let geometry = StreamGeometry {
        direction: request.direction,
        device_id: UNSPECIFIED,
        sample_rate,
        channels,
        format: request.format,
        sharing_mode: SharingMode::Legacy,
        frames_per_burst: burst,
        capacity_frames: burst * config.capacity_bursts() as i32,
    };

    log::info!(
        "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames, latency: {:.1}ms)",
        client_name,
        sample_rate,
        burst,
        geometry.burst_ms()
    );

    let (binding, core) = bind(geometry, control);
    let processor = JackProcessor {
        ports,
        core,
        scratch: vec![0.0; MAX_BUFFER_SIZE * channels as usize],
    };

    let async_client = client
        .activate_async(JackNotifications, processor)
        .map_err(|e| OboeError::Unavailable(format!("Failed to activate JACK client: {}", e)))?;

    if config.jack_autoconnect {
        connect_physical(async_client.as_client(), request.direction, &port_names);
    }

    Ok((JackEndpoint { _async_client: async_client }, binding))
}

/// Wire our ports to the physical system ports in order
fn connect_physical(client: &Client, direction: Direction, ours: &[String]) {
    let flags = match direction {
        Direction::Output => PortFlags::IS_INPUT | PortFlags::IS_PHYSICAL,
        Direction::Input => PortFlags::IS_OUTPUT | PortFlags::IS_PHYSICAL,
    };
    let physical = client.ports(None, Some("audio"), flags);
    if physical.is_empty() {
        log::warn!("No physical JACK {} ports found for connection", direction);
        return;
    }

    for (our_port, system_port) in ours.iter().zip(physical.iter()) {
        let result = match direction {
            Direction::Output => client.connect_ports_by_name(our_port, system_port),
            Direction::Input => client.connect_ports_by_name(system_port, our_port),
        };
        match result {
            Ok(()) => log::info!("Connected {} <-> {}", our_port, system_port),
            Err(e) => log::warn!("Could not connect {}: {}", our_port, e),
        }
    }
}
