//! Simulated radio
//!
//! Stands in for a BLE driver: while scanning is on, every simulated
//! beacon is "heard" twice a second with a jittered signal strength.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use proxima_core::{BeaconSighting, ProximaError, ProximaResult};
use proxima_runtime::{NodeHandle, NodeInput, Scanner};

const SIGHTING_INTERVAL: Duration = Duration::from_millis(500);

/// LE general discoverable, BR/EDR not supported
const ADVERTISING_FLAGS: u8 = 0x06;

/// One simulated beacon
#[derive(Clone, Debug)]
struct SimulatedBeacon {
    address: String,
    name: String,
    /// Mean signal strength at this node
    mean_rssi: f64,
}

/// Simulated beacons plus the switch the scanner flips
pub struct SimulatedRadio {
    active: Arc<AtomicBool>,
    beacons: Vec<SimulatedBeacon>,
    rng: StdRng,
}

impl SimulatedRadio {
    pub fn new(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let beacons = (0..count)
            .map(|i| SimulatedBeacon {
                address: format!("02:00:00:00:00:{:02x}", i),
                name: format!("Simulated {}", i + 1),
                mean_rssi: rng.gen_range(-85.0..-55.0),
            })
            .collect();

        SimulatedRadio {
            active: Arc::new(AtomicBool::new(false)),
            beacons,
            rng,
        }
    }

    /// Scanner half, handed to the node
    pub fn scanner(&self) -> SimulatedScanner {
        SimulatedScanner {
            active: Arc::clone(&self.active),
        }
    }

    /// Emit sightings into `handle` until the node goes away
    pub fn spawn(self, handle: NodeHandle) {
        let SimulatedRadio {
            active,
            beacons,
            mut rng,
        } = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SIGHTING_INTERVAL);
            loop {
                ticker.tick().await;
                if !active.load(Ordering::Relaxed) {
                    if handle.is_closed() {
                        return;
                    }
                    continue;
                }
                for beacon in &beacons {
                    let rssi = beacon.mean_rssi + rng.gen_range(-4.0..4.0);
                    let sighting = BeaconSighting::new(beacon.address.clone(), rssi.round() as i16)
                        .with_name(beacon.name.clone())
                        .with_flags(ADVERTISING_FLAGS);
                    match handle.try_send(NodeInput::Sighting(sighting)) {
                        Ok(()) | Err(ProximaError::QueueFull) => {}
                        Err(_) => {
                            tracing::debug!("node gone, simulated radio stopping");
                            return;
                        }
                    }
                }
            }
        });
    }
}

/// Scanner half of the simulated radio
pub struct SimulatedScanner {
    active: Arc<AtomicBool>,
}

impl Scanner for SimulatedScanner {
    fn start_scanning(&mut self) -> ProximaResult<()> {
        tracing::info!("simulated scanning started");
        self.active.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop_scanning(&mut self) -> ProximaResult<()> {
        tracing::info!("simulated scanning stopped");
        self.active.store(false, Ordering::Relaxed);
        Ok(())
    }
}
