//! Benchmark suite for the BTHome decoder and the InfluxDB formatter.
//!
//! Isolates decoding and formatting from async runtime overhead.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use bthome_listener::{
    AliasMap, InfluxDbFormatter, LocalName, MacAddress, OutputFormatter, Reading, decode,
    decode_advertisement,
};
use std::time::SystemTime;

const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Typical climate sensor: packet id, battery, temperature, humidity.
const CLIMATE: &[u8] = &[0x40, 0x00, 0x2A, 0x01, 0x5D, 0x02, 0xE8, 0x08, 0x03, 0xBF, 0x13];

/// Button with a text object and several binary sensors.
const MIXED: &[u8] = &[
    0x44, 0x00, 0x07, 0x3A, 0x02, 0x21, 0x01, 0x2D, 0x00, 0x53, 0x05, b'h', b'e', b'l', b'l',
    b'o', 0x3C, 0x01, 0xFD,
];

/// Full advertisement: flags, complete name and BTHome service data.
fn advertisement() -> Vec<u8> {
    let mut data = vec![0x02, 0x01, 0x06, 0x08, 0x09];
    data.extend_from_slice(b"Kitchen");
    data.push(u8::try_from(CLIMATE.len() + 3).unwrap_or(u8::MAX));
    data.extend_from_slice(&[0x16, 0xD2, 0xFC]);
    data.extend_from_slice(CLIMATE);
    data
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    for (label, payload) in [("climate", CLIMATE), ("mixed", MIXED)] {
        group.bench_with_input(BenchmarkId::from_parameter(label), payload, |b, payload| {
            b.iter(|| black_box(decode(black_box(payload), None)))
        });
    }

    let name = LocalName {
        bytes: b"Kitchen",
        complete: true,
    };
    group.bench_function("climate_named", |b| {
        b.iter(|| black_box(decode(black_box(CLIMATE), Some(name))))
    });

    let advertisement = advertisement();
    group.bench_function("advertisement", |b| {
        b.iter(|| black_box(decode_advertisement(TEST_MAC, -60, black_box(&advertisement))))
    });

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    group.throughput(Throughput::Elements(1));

    let formatter = InfluxDbFormatter::new("bthome".to_string(), AliasMap::new());
    for (label, payload) in [("climate", CLIMATE), ("mixed", MIXED)] {
        let packet = decode(payload, None).unwrap();
        let reading = Reading {
            mac: TEST_MAC,
            rssi: -60,
            packet: &packet,
            timestamp: SystemTime::UNIX_EPOCH,
        };
        group.bench_function(label, |b| {
            b.iter(|| black_box(formatter.format(black_box(&reading))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_format);
criterion_main!(benches);
