// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

// Scheduler scenarios driven end to end: the master runs against one side
// of an in-memory duplex stream while the test plays the slave on the other
// side, with the clock paused so every timeout fires deterministically.

use std::time::Duration;

use aqualink_frame::codec::FrameCodec;
use aquamaster_lib::devices::jxi_heater::JxiHeater;
use aquamaster_lib::errors::MasterError;
use aquamaster_lib::master::Master;
use aquamaster_lib::registry::DeviceRegistry;
use aquamaster_lib::settings::BusSettings;
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

type Slave = Framed<DuplexStream, FrameCodec>;

fn heater_master(stream: DuplexStream) -> Master<DuplexStream> {
    let mut registry = DeviceRegistry::new();
    registry.insert(0x68, Box::new(JxiHeater::new())).unwrap();
    Master::new(stream, registry, BusSettings::default())
}

async fn next_msg(slave: &mut Slave) -> Vec<u8> {
    slave
        .next()
        .await
        .expect("bus closed")
        .expect("serial error")
        .expect("bad frame")
}

#[tokio::test(start_paused = true)]
async fn probe_times_out_then_recovers() {
    let (bus, remote) = tokio::io::duplex(256);
    let mut master = heater_master(bus);
    let mut slave: Slave = Framed::new(remote, FrameCodec);

    let script = async {
        // The first probe goes out one second after startup. Say nothing.
        let probe = next_msg(&mut slave).await;
        assert_eq!(probe, [0x68, 0x00]);

        // The request times out and is dropped; polling of the (still
        // disconnected) device carries on until the next probe cycle.
        let probe = loop {
            let msg = next_msg(&mut slave).await;
            if msg[1] == 0x00 {
                break msg;
            }
            assert_eq!(msg, [0x68, 0x25]);
        };
        assert_eq!(probe, [0x68, 0x00]);

        // Answer this one; the master flips the device to connected.
        slave.send(vec![0x68, 0x01]).await.unwrap();

        // The device keeps being polled for measurements; feed it one.
        let request = loop {
            let msg = next_msg(&mut slave).await;
            if msg[1] == 0x25 {
                break msg;
            }
        };
        assert_eq!(request, [0x68, 0x25]);
        slave
            .send(vec![0x68, 0x25, 0xe8, 0x03, 0x2a, 0x00, 0x00, 0x00, 0x5a])
            .await
            .unwrap();

        // Let the master consume the reply.
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    tokio::select! {
        _ = master.run() => panic!("master exited early"),
        _ = script => {}
    }

    let device = master.registry().lookup(0x68).unwrap();
    assert!(device.connected());
    assert!(device.data_valid());
    assert_eq!(device.props().get_int("gv_on_time"), Ok(1000));
    assert_eq!(device.props().get_int("ignition_cycles"), Ok(42));
    assert_eq!(device.props().get_int("water_temp"), Ok(70));
    assert_eq!(master.context().get_int("pool_temp"), Ok(70));
}

#[tokio::test(start_paused = true)]
async fn unsolicited_replies_are_discarded() {
    let (bus, remote) = tokio::io::duplex(256);
    let mut master = heater_master(bus);
    let mut slave: Slave = Framed::new(remote, FrameCodec);

    let script = async {
        // Nothing was requested yet; this reply matches no pending request.
        slave.send(vec![0x68, 0x01]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    tokio::select! {
        _ = master.run() => panic!("master exited early"),
        _ = script => {}
    }

    assert!(!master.registry().lookup(0x68).unwrap().connected());
}

#[tokio::test(start_paused = true)]
async fn replies_are_attributed_to_the_request_address() {
    let (bus, remote) = tokio::io::duplex(256);
    let mut master = heater_master(bus);
    let mut slave: Slave = Framed::new(remote, FrameCodec);

    let script = async {
        let probe = next_msg(&mut slave).await;
        assert_eq!(probe, [0x68, 0x00]);

        // Echo a wrong address; the master routes by the request it sent,
        // so the heater at 0x68 still consumes these measurements.
        slave
            .send(vec![0x99, 0x25, 0xe8, 0x03, 0x2a, 0x00, 0x00, 0x00, 0x5a])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    };

    tokio::select! {
        _ = master.run() => panic!("master exited early"),
        _ = script => {}
    }

    let device = master.registry().lookup(0x68).unwrap();
    assert_eq!(device.props().get_int("water_temp"), Ok(70));
    // A measurement reply is not a probe response.
    assert!(!device.connected());
}

#[tokio::test(start_paused = true)]
async fn liveness_expires_without_replies() {
    let (bus, remote) = tokio::io::duplex(256);
    let mut master = heater_master(bus);
    let mut slave: Slave = Framed::new(remote, FrameCodec);

    let script = async {
        let probe = next_msg(&mut slave).await;
        assert_eq!(probe, [0x68, 0x00]);
        slave.send(vec![0x68, 0x01]).await.unwrap();

        // Swallow every poll without answering until the liveness window
        // (two seconds) lapses and the device drops back to disconnected.
        tokio::time::timeout(Duration::from_millis(2500), async {
            loop {
                let _ = next_msg(&mut slave).await;
            }
        })
        .await
        .unwrap_err();
    };

    tokio::select! {
        _ = master.run() => panic!("master exited early"),
        _ = script => {}
    }

    assert!(!master.registry().lookup(0x68).unwrap().connected());
}

#[tokio::test(start_paused = true)]
async fn eof_is_fatal() {
    let (bus, remote) = tokio::io::duplex(256);
    let mut master = heater_master(bus);
    drop(remote);

    let err = master.run().await.unwrap_err();
    assert!(matches!(err, MasterError::StreamEof));
}
