use std::net::SocketAddr;

use seedlink4_protocol::frame::{DEFAULT_MAX_PAYLOAD_LEN, legacy, read_frame};
use seedlink4_protocol::{Record, SequenceNumber};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct MockConfig {
    pub hello_line1: String,
    pub hello_line2: String,
    /// Raw bytes written after answering `DATA`, or after an `END` that
    /// starts the stream.
    pub frames: Vec<Vec<u8>>,
    pub accept_slproto: bool,
    pub reject_station: bool,
    pub close_after_stream: bool,
    /// Credentials accepted by `AUTH USERPASS`.
    pub credentials: (String, String),
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            hello_line1: "SeedLink v4.0 :: SLPROTO:4.0 SLPROTO:3.1 CAP:AUTH:USERPASS".to_owned(),
            hello_line2: "Mock Server".to_owned(),
            frames: Vec::new(),
            accept_slproto: true,
            reject_station: false,
            close_after_stream: false,
            credentials: ("feeder".to_owned(), "secret".to_owned()),
        }
    }
}

/// A 512-byte miniSEED-2-shaped payload for station GE.WLF.
pub fn legacy_payload() -> Vec<u8> {
    let mut payload = vec![0u8; legacy::PAYLOAD_LEN];
    payload[8..13].copy_from_slice(b"WLF  ");
    payload[18..20].copy_from_slice(b"GE");
    payload
}

pub fn legacy_record(seq: i64) -> Record {
    let sequence = if seq < 0 {
        SequenceNumber::UNDEFINED
    } else {
        SequenceNumber::new(seq).unwrap()
    };
    Record::legacy(sequence, legacy_payload())
}

pub fn legacy_frame(seq: i64) -> Vec<u8> {
    legacy_record(seq).encode().unwrap()
}

/// Single-connection scripted server.
///
/// Records received after `FEED` are forwarded to [`MockServer::next_fed`].
pub struct MockServer {
    addr: SocketAddr,
    fed: mpsc::UnboundedReceiver<Record>,
    commands: mpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, fed) = mpsc::unbounded_channel();
        let (seen, commands) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            Self::handle_connection(listener, config, tx, seen).await;
        });

        Self {
            addr,
            fed,
            commands,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Next record a feeder sent, or `None` once the feed connection closed.
    pub async fn next_fed(&mut self) -> Option<Record> {
        self.fed.recv().await
    }

    /// Next command line received, without the line terminator.
    pub async fn next_command(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    async fn handle_connection(
        listener: TcpListener,
        config: MockConfig,
        fed: mpsc::UnboundedSender<Record>,
        seen: mpsc::UnboundedSender<String>,
    ) {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let mut subscribed = false;
        let mut streaming = false;

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim();
            let keyword = trimmed.split_whitespace().next().unwrap_or("");
            let _ = seen.send(trimmed.to_owned());

            let reply: Vec<u8> = match keyword {
                "HELLO" => format!("{}\r\n{}\r\n", config.hello_line1, config.hello_line2)
                    .into_bytes(),
                "SLPROTO" if config.accept_slproto => b"OK\r\n".to_vec(),
                "SLPROTO" => b"ERROR\r\n".to_vec(),
                "STATION" if config.reject_station => {
                    b"ERROR ARGUMENTS unknown station\r\n".to_vec()
                }
                "STATION" => {
                    subscribed = true;
                    b"OK\r\n".to_vec()
                }
                "ACCEPT" | "USERAGENT" | "SELECT" => b"OK\r\n".to_vec(),
                "AUTH" => {
                    let args: Vec<&str> = trimmed.split_whitespace().skip(2).collect();
                    let (user, pass) = &config.credentials;
                    if args == [user.as_str(), pass.as_str()] {
                        b"OK\r\n".to_vec()
                    } else {
                        b"ERROR AUTH invalid credentials\r\n".to_vec()
                    }
                }
                // Start-of-transfer marker: no reply.
                "END" if streaming => continue,
                "DATA" | "END" if subscribed => {
                    streaming = true;
                    let mut out = Vec::new();
                    if keyword == "DATA" {
                        out.extend_from_slice(b"OK\r\n");
                    }
                    for frame in &config.frames {
                        out.extend_from_slice(frame);
                    }
                    if write_half.write_all(&out).await.is_err() {
                        break;
                    }
                    let _ = write_half.flush().await;
                    if config.close_after_stream {
                        break;
                    }
                    continue;
                }
                "END" => {
                    let _ = write_half.write_all(b"OK\r\n").await;
                    break;
                }
                "FEED" => {
                    if write_half.write_all(b"OK\r\n").await.is_err() {
                        break;
                    }
                    let max = DEFAULT_MAX_PAYLOAD_LEN;
                    while let Ok(Some(record)) = read_frame(&mut reader, max).await {
                        if fed.send(record).is_err() {
                            break;
                        }
                    }
                    break;
                }
                "BYE" => break,
                _ => b"ERROR\r\n".to_vec(),
            };

            if write_half.write_all(&reply).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
        let _ = write_half.shutdown().await;
    }
}
