//! Periodic sensor sampling.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use sensey_types::Reading;

use crate::error::Result;
use crate::queue::DurableQueue;

/// A source of named numeric measurements.
#[async_trait]
pub trait Sensor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Take one sample of all this sensor's fields.
    async fn sample(&self) -> Result<BTreeMap<String, f64>>;
}

/// A sensor producing values jittered around fixed baselines. Stands in for
/// real hardware in development and demos.
pub struct SimulatedSensor {
    name: String,
    channels: Vec<Channel>,
}

struct Channel {
    field: String,
    base: f64,
    amplitude: f64,
}

impl SimulatedSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, field: impl Into<String>, base: f64, amplitude: f64) -> Self {
        self.channels.push(Channel {
            field: field.into(),
            base,
            amplitude,
        });
        self
    }

    /// A plausible indoor climate sensor.
    pub fn indoor_climate() -> Self {
        Self::new("climate")
            .with_channel("temperature", 21.5, 1.5)
            .with_channel("humidity", 45.0, 8.0)
    }
}

#[async_trait]
impl Sensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sample(&self) -> Result<BTreeMap<String, f64>> {
        let mut rng = rand::rng();
        let mut fields = BTreeMap::new();
        for channel in &self.channels {
            let offset = rng.random_range(-channel.amplitude..=channel.amplitude);
            fields.insert(channel.field.clone(), channel.base + offset);
        }
        Ok(fields)
    }
}

/// Samples all sensors on a fixed cadence and enqueues one merged reading
/// per tick.
pub struct Poller {
    client_id: String,
    sensors: Vec<Box<dyn Sensor>>,
    poll_interval: Duration,
    queue: Arc<Mutex<DurableQueue>>,
    wakeup: Arc<Notify>,
}

impl Poller {
    pub fn new(
        client_id: impl Into<String>,
        sensors: Vec<Box<dyn Sensor>>,
        poll_interval: Duration,
        queue: Arc<Mutex<DurableQueue>>,
        wakeup: Arc<Notify>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            sensors,
            poll_interval,
            queue,
            wakeup,
        }
    }

    /// Run forever on the configured cadence.
    pub async fn run(self) {
        info!(
            "Poller started for {} with {} sensor(s), interval {:?}",
            self.client_id,
            self.sensors.len(),
            self.poll_interval
        );

        let mut ticker = interval(self.poll_interval);
        let mut consecutive_failures = 0u32;

        loop {
            ticker.tick().await;

            match self.collect_reading().await {
                Some(reading) => {
                    consecutive_failures = 0;
                    let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                    match queue.push(reading) {
                        Ok(_) => {
                            debug!("Enqueued reading, {} pending", queue.len());
                            drop(queue);
                            self.wakeup.notify_one();
                        }
                        Err(e) => warn!("Failed to enqueue reading: {}", e),
                    }
                }
                None => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!(
                            "All sensors failed (attempt {}), skipping tick",
                            consecutive_failures
                        );
                    } else if consecutive_failures == 4 {
                        error!(
                            "All sensors failed {} times, will continue trying silently",
                            consecutive_failures
                        );
                    }
                }
            }
        }
    }

    /// Sample every sensor and merge the results into one reading. A failing
    /// sensor is skipped; `None` means no sensor produced anything.
    async fn collect_reading(&self) -> Option<Reading> {
        let mut reading = Reading::now(&self.client_id);

        for sensor in &self.sensors {
            match sensor.sample().await {
                Ok(fields) => reading.fields.extend(fields),
                Err(e) => warn!("Sensor {} failed: {}", sensor.name(), e),
            }
        }

        if reading.fields.is_empty() {
            None
        } else {
            Some(reading)
        }
    }
}
