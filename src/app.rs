//! Core application runner (business logic) for `bthome-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically.

use crate::alias::{Alias, AliasMap};
use crate::cache::{DeviceCache, Upsert};
use crate::output::influxdb::InfluxDbFormatter;
use crate::output::{OutputFormatter, Reading};
use crate::scanner::{ScanError, Sighting, SightingResult};
use crate::throttle::{Throttle, parse_duration};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// The name of the measurement in InfluxDB line protocol.
    #[arg(long, env = "BTHOME_INFLUXDB_MEASUREMENT", default_value = "bthome")]
    pub influxdb_measurement: String,

    /// Specify human-readable alias for a device address.
    /// Format: --alias DE:AD:BE:EF:00:00=Sauna
    #[arg(
        long = "alias",
        env = "BTHOME_ALIAS",
        value_parser = crate::alias::parse_alias,
        value_delimiter = ',',
        value_name = "ALIAS"
    )]
    pub aliases: Vec<Alias>,

    /// Only report devices that have an alias
    #[arg(long, env = "BTHOME_ONLY_ALIASED")]
    pub only_aliased: bool,

    /// Only write these BTHome object ids (hex like 0x02 or decimal).
    /// Repeat the flag or separate with commas. Default: all objects.
    #[arg(
        long = "object",
        env = "BTHOME_OBJECT",
        value_parser = parse_object_id,
        value_delimiter = ',',
        value_name = "ID"
    )]
    pub objects: Vec<u8>,

    /// Report packets with the encryption flag set instead of dropping them
    #[arg(long, env = "BTHOME_INCLUDE_ENCRYPTED")]
    pub include_encrypted: bool,

    /// Verbose output, print parse errors for unrecognized data
    #[arg(short = 'v', long = "verbose", env = "BTHOME_VERBOSE")]
    pub verbose: bool,

    /// Throttle events per device to at most one per interval.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, env = "BTHOME_THROTTLE", value_parser = parse_duration)]
    pub throttle: Option<Duration>,

    /// Maximum number of devices kept in the device cache
    #[arg(long, env = "BTHOME_CACHE_CAPACITY", default_value_t = crate::cache::DEFAULT_CAPACITY)]
    pub cache_capacity: usize,

    /// Longest time to wait for the device cache lock before dropping an update
    #[arg(long, env = "BTHOME_LOCK_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub lock_timeout: Duration,

    /// Periodically write every cached device, not only fresh sightings
    #[arg(long, env = "BTHOME_SNAPSHOT_INTERVAL", value_parser = parse_duration)]
    pub snapshot_interval: Option<Duration>,

    /// Leave devices out of snapshots when not heard from for this long
    #[arg(long, env = "BTHOME_STALE_AFTER", default_value = "10m", value_parser = parse_duration)]
    pub stale_after: Duration,

    /// Bluetooth adapter to scan with (e.g. hci1). Default: the system default adapter
    #[arg(long, env = "BTHOME_ADAPTER")]
    pub adapter: Option<String>,
}

/// Parse a BTHome object id given as `0x2E`, `2e` with a `0x` prefix, or decimal `46`.
pub fn parse_object_id(src: &str) -> Result<u8, String> {
    let src = src.trim();
    let parsed = match src.strip_prefix("0x").or_else(|| src.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => src.parse::<u8>(),
    };
    parsed.map_err(|_| format!("invalid object id '{src}': expected 0x00-0xFF or 0-255"))
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Future returned by [`Scanner::start_scan`].
pub type ScanFuture<'a> =
    Pin<Box<dyn Future<Output = Result<mpsc::Receiver<SightingResult>, ScanError>> + Send + 'a>>;

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(&self, adapter: Option<String>, verbose: bool) -> ScanFuture<'_>;
}

/// Real scanner implementation that delegates to the compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn start_scan(&self, adapter: Option<String>, verbose: bool) -> ScanFuture<'_> {
        Box::pin(async move { crate::scanner::start_scan(adapter, verbose).await })
    }
}

/// What woke the run loop up.
enum Tick {
    Sighting(Option<SightingResult>),
    Snapshot,
}

/// Per-run state shared by the sighting and snapshot paths.
struct Listener<'a> {
    options: &'a Options,
    aliases: AliasMap,
    formatter: InfluxDbFormatter,
    throttle: Option<Throttle>,
    cache: &'a DeviceCache,
}

impl Listener<'_> {
    fn accepts(&self, sighting: &Sighting) -> bool {
        if self.options.only_aliased && !self.aliases.contains_key(&sighting.mac) {
            log::debug!("Ignoring {}: no alias", sighting.mac);
            return false;
        }
        if sighting.packet.device_info.encrypted && !self.options.include_encrypted {
            log::debug!("Ignoring encrypted packet from {}", sighting.mac);
            return false;
        }
        true
    }

    async fn handle_sighting(&mut self, sighting: Sighting, out: &mut dyn Write) -> io::Result<()> {
        if !self.accepts(&sighting) {
            return Ok(());
        }

        let upsert = self
            .cache
            .upsert_at(
                sighting.mac,
                sighting.rssi,
                sighting.packet.clone(),
                sighting.timestamp,
            )
            .await;

        match upsert {
            Ok(Upsert::Evicted { evicted, .. }) => {
                if let Some(throttle) = self.throttle.as_mut() {
                    throttle.forget(&evicted);
                }
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Dropping sighting from {}: {e}", sighting.mac);
                return Ok(());
            }
        }

        let should_emit = self
            .throttle
            .as_mut()
            .is_none_or(|t: &mut Throttle| t.should_emit(sighting.mac));

        if should_emit {
            let line = self.formatter.format(&Reading::from(&sighting));
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    /// Write one line per cached device heard from within `stale_after`.
    async fn write_snapshot(&self, out: &mut dyn Write) -> io::Result<()> {
        let now = SystemTime::now();
        let stale_after = self.options.stale_after;
        let mut lines = Vec::new();

        let walked = self
            .cache
            .iterate(|entry| {
                if !entry.is_stale(now, stale_after) {
                    lines.push(self.formatter.format(&Reading::from(entry)));
                }
                true
            })
            .await;

        if let Err(e) = walked {
            log::warn!("Skipping snapshot: {e}");
            return Ok(());
        }

        for line in lines {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

fn snapshot_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Run the core processing loop, writing formatted output to `out` and verbose errors to `err`.
///
/// - Accepted sightings are stored in `cache`, optionally throttled, formatted and written to `out`.
/// - With a snapshot interval, every fresh cache entry is written to `out` on each tick.
/// - On decode errors, it writes the error to `err` only when `options.verbose` is true.
pub async fn run_with_io(
    options: Options,
    scanner: &dyn Scanner,
    cache: &DeviceCache,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<(), RunError> {
    let aliases: AliasMap = crate::alias::to_map(&options.aliases);
    let formatter = InfluxDbFormatter::new(options.influxdb_measurement.clone(), aliases.clone())
        .with_objects(options.objects.iter().copied());

    let mut listener = Listener {
        options: &options,
        aliases,
        formatter,
        throttle: options.throttle.map(Throttle::new),
        cache,
    };

    let mut sightings = scanner
        .start_scan(options.adapter.clone(), options.verbose)
        .await?;
    let mut snapshots = options.snapshot_interval.map(snapshot_timer);

    loop {
        let tick = match snapshots.as_mut() {
            Some(timer) => tokio::select! {
                result = sightings.recv() => Tick::Sighting(result),
                _ = timer.tick() => Tick::Snapshot,
            },
            None => Tick::Sighting(sightings.recv().await),
        };

        match tick {
            Tick::Sighting(None) => break,
            Tick::Sighting(Some(Ok(sighting))) => listener.handle_sighting(sighting, out).await?,
            Tick::Sighting(Some(Err(scan_err))) => {
                if options.verbose {
                    writeln!(err, "{scan_err}")?;
                }
            }
            Tick::Snapshot => listener.write_snapshot(out).await?,
        }
    }

    Ok(())
}
