//! Receive, transmit and console loops driven end to end over mock devices.

mod common;

use common::{create_mock_port_with_responses, mock_session, output_text, test_config};
use pretty_assertions::assert_eq;
use rs485_link::port::{LineLevel, MockSerialPort};
use rs485_link::service::{self, ReceiveOptions, StopReason, TransmitSummary};
use rs485_link::session::{Direction, HalfDuplexSession};
use std::io::Cursor;
use std::thread;
use std::time::Duration;

#[test]
fn transmit_then_receive_across_a_pair() {
    let (tx_end, rx_end) = MockSerialPort::pair("COM1", "COM2");
    let mut transmitter = HalfDuplexSession::from_adapter(tx_end, test_config("COM1"));
    let mut receiver = HalfDuplexSession::from_adapter(rx_end, test_config("COM2"));

    let payload = vec!["temp=21\r".to_string(), "temp=22\r".to_string()];
    let mut out = Vec::new();
    let summary = service::run_transmit(
        &mut transmitter,
        &mut Cursor::new(""),
        &mut out,
        &payload,
        false,
    )
    .unwrap();
    assert_eq!(summary, TransmitSummary { writes: 2, bytes: 16 });
    assert!(output_text(out).contains("temp=21\r written to COM1"));

    let options = ReceiveOptions {
        max_lines: Some(2),
        ..Default::default()
    };
    let mut out = Vec::new();
    let summary = service::run_receive(&mut receiver, &mut out, &options).unwrap();
    assert_eq!(summary.lines, 2);
    assert_eq!(summary.stopped, StopReason::LimitReached);

    let text = output_text(out);
    assert!(text.contains("\t temp=21\n"));
    assert!(text.contains("\t temp=22\n"));
}

#[test]
fn step_through_waits_for_each_enter() {
    let device = MockSerialPort::new("COM32");
    let mut session = mock_session(&device, "COM32");
    let payload: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();

    let mut input = Cursor::new("\n\n\n");
    let mut out = Vec::new();
    service::run_transmit(&mut session, &mut input, &mut out, &payload, true).unwrap();

    assert_eq!(input.position(), 3);
    assert_eq!(
        device.get_write_log(),
        vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]
    );
}

#[test]
fn detailed_receive_with_timestamps() {
    let device = create_mock_port_with_responses("COM32", &[b"caf\xc3\xa9\r"]);
    let mut session = mock_session(&device, "COM32");
    let options = ReceiveOptions {
        detailed: true,
        timestamps: true,
        max_lines: Some(1),
    };

    let mut out = Vec::new();
    service::run_receive(&mut session, &mut out, &options).unwrap();
    let text = output_text(out);
    assert!(text.contains("length: 5 bytes"));
    assert!(text.contains("ASCII:  \"caf\\xc3\\xa9\""));
    assert!(text.contains("UTF-8:  \"café\""));
    assert!(text.contains("] \n--- received ---"));
}

#[test]
fn receive_stops_on_close_from_another_thread() {
    let device = MockSerialPort::new("COM32");
    let mut session = mock_session(&device, "COM32");
    let handle = session.close_handle();

    let closer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        handle.close();
    });

    let mut out = Vec::new();
    let summary = service::run_receive(&mut session, &mut out, &ReceiveOptions::default()).unwrap();
    closer.join().unwrap();

    assert_eq!(summary.stopped, StopReason::Closed);
    assert_eq!(summary.lines, 0);
    assert_eq!(device.handle_count(), 1);
}

#[test]
fn console_sends_and_returns_to_receive() {
    let (local, remote) = MockSerialPort::pair("COM1", "COM2");
    let mut session = HalfDuplexSession::from_adapter(local.clone(), test_config("COM1"));

    let mut input = Cursor::new("ping\nquit\n");
    let mut out = Vec::new();
    let summary = service::run_console(&mut session, &mut input, &mut out).unwrap();
    assert_eq!(summary.sent, 1);

    let mut peer = HalfDuplexSession::from_adapter(remote, test_config("COM2"));
    peer.set_direction(Direction::Receive).unwrap();
    assert_eq!(peer.read_line().unwrap(), "ping");

    assert_eq!(
        local.line_history(),
        vec![LineLevel::Asserted, LineLevel::Deasserted, LineLevel::Asserted]
    );
    assert_eq!(session.direction(), Some(Direction::Receive));
}
