//! Smoke tests against a public broker.
//!
//! Point `TEST_MQTT_ADDRESS` at a broker (defaults to
//! test.mosquitto.org:1883) and run with `--ignored`.

use dotenvy::dotenv;
use libmqtt::mqtt::{Client, ConnectOptions, Message, QoS};
use libmqtt::network::{Read, Transport, Write};
use libmqtt::time::StdTimer;
use std::env;
use std::io::{Read as StdRead, Write as StdWrite};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct NetTransport {
    stream: TcpStream,
}

impl Read for NetTransport {
    type Error = std::io::Error;

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(timeout_ms.max(1) as u64)))?;
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}

impl Write for NetTransport {
    type Error = std::io::Error;

    fn write(&mut self, buf: &[u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        self.stream
            .set_write_timeout(Some(Duration::from_millis(timeout_ms.max(1) as u64)))?;
        let n = self.stream.write(buf)?;
        self.stream.flush()?;
        Ok(n)
    }
}

impl Transport for NetTransport {}

static LIVE_MESSAGES: AtomicUsize = AtomicUsize::new(0);

fn count_message(_msg: &Message<'_>) {
    LIVE_MESSAGES.fetch_add(1, Ordering::SeqCst);
}

fn broker_transport() -> NetTransport {
    dotenv().ok();
    let address = env::var("TEST_MQTT_ADDRESS").unwrap_or("test.mosquitto.org:1883".to_string());
    let stream = TcpStream::connect(address).expect("Failed to connect to broker");
    NetTransport { stream }
}

#[test]
#[ignore = "requires network access to a public broker"]
fn test_connect_to_public_broker() {
    let mut client: Client<NetTransport, StdTimer> = Client::new(broker_transport(), 5000);
    client
        .connect(&ConnectOptions {
            client_id: "libmqtt-test-client-12345",
            keep_alive_seconds: 10,
            clean_session: true,
            ..ConnectOptions::default()
        })
        .expect("Failed to connect");
    assert!(client.is_connected());
    client.disconnect().expect("Failed to disconnect");
}

#[test]
#[ignore = "requires network access to a public broker"]
fn test_publish_and_receive() {
    let mut client: Client<NetTransport, StdTimer> = Client::new(broker_transport(), 5000);
    client
        .connect(&ConnectOptions {
            client_id: "libmqtt-test-client-67890",
            keep_alive_seconds: 10,
            clean_session: true,
            ..ConnectOptions::default()
        })
        .expect("Failed to connect");

    let topic = "libmqtt/test-topic";
    client
        .subscribe(topic, QoS::AtLeastOnce, count_message)
        .expect("Failed to subscribe");
    client
        .publish(topic, b"hello world", QoS::AtLeastOnce, false)
        .expect("Failed to publish");

    client.poll(3000).expect("Failed to poll");
    assert!(LIVE_MESSAGES.load(Ordering::SeqCst) >= 1);

    client.disconnect().expect("Failed to disconnect");
}
