mod common;

use core::convert::Infallible;
use core::fmt::Write;

use common::{frame, http_response, LinkDown, ScriptedTransport, VirtualClock};

use embedded_hal::digital::v2::OutputPin;
use rtl8720dn::{Error, Protocol, Rtl8720dn};

type Device = Rtl8720dn<ScriptedTransport, VirtualClock>;

fn device(link: &ScriptedTransport) -> Device {
    Rtl8720dn::new(link.clone(), VirtualClock::new())
}

const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

/// Scripts a connection to example.com:80 that answers `REQUEST` with
/// `response` and is closed afterwards.
fn script_http_exchange(link: &ScriptedTransport, response: &[u8]) {
    let mut sent = b"\r\nRecv 37 bytes\r\n\r\nSEND OK\r\n".to_vec();
    sent.extend_from_slice(&frame(0, response));

    link.reply_to(
        b"AT+CIPSTART=0,\"TCP\",\"example.com\",80\r\n",
        b"AT+CIPSTART=0,\"TCP\",\"example.com\",80\r\r\n0,CONNECT\r\n\r\nOK\r\n",
    )
    .reply_to(b"AT+CIPSEND=0,37\r\n", b"AT+CIPSEND=0,37\r\r\n\r\nOK\r\n\r\n>")
    .reply_to(REQUEST, &sent)
    .reply_to(b"AT+CIPCLOSE=0\r\n", b"0,CLOSED\r\n\r\nOK\r\n");
}

/// Reads until the device would block.
fn read_to_end(wifi: &mut Device, piece: usize) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = vec![0u8; piece];

    loop {
        match wifi.socket_read(&mut buf) {
            Ok(len) => received.extend_from_slice(&buf[..len]),
            Err(nb::Error::WouldBlock) => break,
            Err(nb::Error::Other(err)) => panic!("read failed: {:?}", err),
        }
    }

    received
}

#[test]
fn http_get_round_trip() {
    let response = http_response(b"<html>hello</html>");

    let link = ScriptedTransport::new();
    assert_eq!(REQUEST.len(), 37);
    script_http_exchange(&link, &response);

    let mut wifi = device(&link);
    let mut received = Vec::new();

    {
        let mut socket = wifi.connect(Protocol::Tcp, "example.com", 80).unwrap();
        assert_eq!(socket.write(REQUEST).unwrap(), REQUEST.len());

        let mut buf = [0u8; 16];
        loop {
            match socket.read(&mut buf) {
                Ok(len) => received.extend_from_slice(&buf[..len]),
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(err)) => panic!("read failed: {:?}", err),
            }
        }
    }

    assert_eq!(received, response);
    assert_eq!(link.unanswered(), 0);
    assert!(link.written_str().ends_with("AT+CIPCLOSE=0\r\n"));
}

#[test]
fn reads_are_served_from_the_buffered_response() {
    let response = http_response(&[b'x'; 300]);

    let link = ScriptedTransport::new();
    script_http_exchange(&link, &response);

    let mut wifi = device(&link);
    let mut socket = wifi.connect(Protocol::Tcp, "example.com", 80).unwrap();
    socket.write_all(REQUEST).unwrap();

    let mut buf = [0u8; 64];
    assert_eq!(socket.read(&mut buf), Ok(64));
    let polls = link.polls();

    // Everything else is already here.
    let mut rest = 64;
    while rest < response.len() {
        rest += socket.read(&mut buf).unwrap();
    }

    assert_eq!(rest, response.len());
    assert_eq!(link.polls(), polls);
}

#[test]
fn read_with_nothing_expected_would_block() {
    let link = ScriptedTransport::new();
    let mut wifi = device(&link);

    assert_eq!(read_to_end(&mut wifi, 8), Vec::<u8>::new());
    assert_eq!(link.polls(), 0);
}

#[test]
fn unsolicited_data_is_read_when_data_ready() {
    let link = ScriptedTransport::new();
    link.push(&frame(0, &http_response(b"push")));

    let mut wifi = device(&link);

    assert_eq!(read_to_end(&mut wifi, 8), http_response(b"push"));
}

#[test]
fn prompt_arriving_after_ok_is_waited_for() {
    let link = ScriptedTransport::new();
    link.reply_in_pieces(b"AT+CIPSEND=0,4\r\n", &[b"\r\nOK\r\n", b"\r\n> "])
        .reply_to(b"ping", b"\r\nRecv 4 bytes\r\n\r\nSEND OK\r\n");

    let mut wifi = device(&link);

    assert_eq!(wifi.socket_write(b"ping"), Ok(4));
    assert!(link.written_str().ends_with("AT+CIPSEND=0,4\r\nping"));
}

#[test]
fn send_fail_is_reported() {
    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CIPSEND=0,4\r\n", b"\r\nOK\r\n> ")
        .reply_to(b"ping", b"\r\nRecv 4 bytes\r\n\r\nSEND FAIL\r\n");

    let mut wifi = device(&link);

    assert_eq!(wifi.socket_write(b"ping"), Err(Error::SendFailed));
}

#[test]
fn large_writes_are_split() {
    let payload = vec![b'x'; 2100];

    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CIPSEND=0,2048\r\n", b"\r\nOK\r\n> ")
        .reply_to(&payload[..2048], b"\r\nSEND OK\r\n")
        .reply_to(b"AT+CIPSEND=0,52\r\n", b"\r\nOK\r\n> ")
        .reply_to(&payload[..52], b"\r\nSEND OK\r\n")
        .reply_to(b"AT+CIPCLOSE=0\r\n", b"\r\nOK\r\n");

    let mut wifi = device(&link);
    let mut socket = rtl8720dn::ConnectedSocket::new(&mut wifi);

    socket.write_all(&payload).unwrap();
    drop(socket);

    assert_eq!(link.unanswered(), 0);
}

#[test]
fn formatted_writes_send_each_piece() {
    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CIPSEND=0,5\r\n", b"\r\nOK\r\n> ")
        .reply_to(b"GET /", b"\r\nSEND OK\r\n")
        .reply_to(b"AT+CIPSEND=0,10\r\n", b"\r\nOK\r\n> ")
        .reply_to(b"index.html", b"\r\nSEND OK\r\n")
        .reply_to(b"AT+CIPSEND=0,11\r\n", b"\r\nOK\r\n> ")
        .reply_to(b" HTTP/1.1\r\n", b"\r\nSEND OK\r\n")
        .reply_to(b"AT+CIPCLOSE=0\r\n", b"\r\nOK\r\n");

    let mut wifi = device(&link);
    let mut socket = rtl8720dn::ConnectedSocket::new(&mut wifi);

    let page = String::from("index.html");
    write!(socket, "GET /{} HTTP/1.1\r\n", page).unwrap();
    drop(socket);

    assert_eq!(link.unanswered(), 0);
}

#[test]
fn failed_connect_returns_no_socket() {
    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CIPSTART", b"\r\nERROR\r\nCLOSED\r\n");

    let mut wifi = device(&link);

    match wifi.connect(Protocol::Udp, "10.0.0.2", 123) {
        Err(Error::ErrorResponse) => {}
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("connect should have failed"),
    }
    assert!(link
        .written_str()
        .starts_with("AT+CIPSTART=0,\"UDP\",\"10.0.0.2\",123\r\n"));
}

#[test]
fn frame_after_at_reply_seeds_the_next_read() {
    let response = http_response(b"pong");
    let mut reply = b"\r\nOK\r\n".to_vec();
    reply.extend_from_slice(&frame(0, &response));

    let link = ScriptedTransport::new();
    link.reply_to(b"AT\r\n", &reply);

    let mut wifi = device(&link);
    assert!(wifi.is_connected());

    let mut out = [0u8; 256];
    let len = wifi.receive_framed(1_000, &mut out).unwrap();
    assert_eq!(&out[..len], &response[..]);
}

#[test]
fn silent_chip_is_not_connected() {
    let link = ScriptedTransport::new();
    let clock = VirtualClock::new();
    let mut wifi = Rtl8720dn::new(link.clone(), clock.clone());

    assert!(!wifi.is_connected());
    assert_eq!(clock.elapsed_ms(), 1_000);
}

#[test]
fn wait_response_times_out() {
    let link = ScriptedTransport::new();
    link.push(b"AT+CWMODE=1\r\r\n");

    let mut wifi = device(&link);
    let timeout = fugit::MillisDurationU32::from_ticks(50);

    assert_eq!(wifi.wait_response(timeout), Err(Error::ResponseTimeout));
}

#[test]
fn reply_without_terminator_overflows_the_window() {
    let link = ScriptedTransport::new();
    link.push(&vec![b'a'; 3000]);

    let mut wifi = device(&link);
    let timeout = fugit::MillisDurationU32::from_ticks(50);

    assert_eq!(wifi.wait_response(timeout), Err(Error::ResponseTooLong));
}

#[test]
fn transport_failure_during_command() {
    let link = ScriptedTransport::new();
    link.fail();

    let mut wifi = device(&link);
    wifi.send_command(b"AT+GMR").unwrap();

    let timeout = fugit::MillisDurationU32::from_ticks(50);
    assert_eq!(wifi.wait_response(timeout), Err(Error::Transport(LinkDown)));
}

#[test]
fn overlong_command_is_rejected() {
    let link = ScriptedTransport::new();
    let mut wifi = device(&link);

    let ssid = "s".repeat(300);
    assert_eq!(wifi.wifi_connect(&ssid, "pw"), Err(Error::CommandTooLong));
    assert!(link.written().is_empty());
}

#[test]
fn partial_writes_are_retried() {
    let link = ScriptedTransport::new();
    link.limit_writes(3)
        .reply_to(b"AT+CWMODE=1\r\n", b"AT+CWMODE=1\r\r\n\r\nOK\r\n");

    let mut wifi = device(&link);

    assert_eq!(wifi.set_station_mode(), Ok(()));
    assert_eq!(link.written(), b"AT+CWMODE=1\r\n");
}

#[test]
fn wifi_connect_sends_credentials() {
    let link = ScriptedTransport::new();
    link.reply_to(
        b"AT+CWJAP=\"OKnet\",\"hunter2\"\r\n",
        b"AT+CWJAP=\"OKnet\",\"hunter2\"\r\r\nWIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n",
    );

    let mut wifi = device(&link);

    assert_eq!(wifi.wifi_connect("OKnet", "hunter2"), Ok(()));
}

#[test]
fn wifi_connect_failure() {
    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CWJAP", b"+CWJAP:1\r\n\r\nFAIL\r\n");

    let mut wifi = device(&link);

    assert_eq!(
        wifi.wifi_connect("home", "wrong"),
        Err(Error::ErrorResponse)
    );
}

#[test]
fn station_ip_and_firmware_version() {
    let link = ScriptedTransport::new();
    link.reply_to(
        b"AT+CIPSTA?\r\n",
        b"+CIPSTA:ip:\"192.168.1.42\"\r\n+CIPSTA:gateway:\"192.168.1.1\"\r\n\r\nOK\r\n",
    )
    .reply_to(
        b"AT+GMR\r\n",
        b"AT+GMR\r\r\nAT version:2.1.0.0-dev\r\nSDK version:v3.3\r\n\r\nOK\r\n",
    );

    let mut wifi = device(&link);

    assert_eq!(wifi.station_ip(), Ok([192, 168, 1, 42]));
    assert_eq!(
        wifi.firmware_version().unwrap(),
        &b"AT version:2.1.0.0-dev\r\nSDK version:v3.3"[..]
    );
}

#[test]
fn station_ip_missing_from_reply() {
    let link = ScriptedTransport::new();
    link.reply_to(b"AT+CIPSTA?\r\n", b"\r\nOK\r\n");

    let mut wifi = device(&link);

    assert_eq!(wifi.station_ip(), Err(Error::UnexpectedResponse));
}

#[derive(Default)]
struct ChipPu {
    levels: Vec<bool>,
}

impl OutputPin for ChipPu {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.levels.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.levels.push(true);
        Ok(())
    }
}

#[test]
fn reset_pulses_chip_pu_and_waits_for_banner() {
    let link = ScriptedTransport::new();
    link.push(b"\r\n\x00\xffboot log\r\nready\r\n");

    let clock = VirtualClock::new();
    let mut wifi = Rtl8720dn::new(link.clone(), clock.clone());
    let mut chip_pu = ChipPu::default();

    assert_eq!(wifi.reset(&mut chip_pu), Ok(()));
    assert_eq!(chip_pu.levels, vec![false, true]);
    assert_eq!(clock.elapsed_ms(), 520);
}

#[test]
fn reset_without_banner_times_out() {
    let link = ScriptedTransport::new();
    let mut wifi = device(&link);

    assert_eq!(
        wifi.reset(&mut ChipPu::default()),
        Err(Error::ResponseTimeout)
    );
}
