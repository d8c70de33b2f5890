// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! A basic two-way message channel over a TCP stream.

use crate::envelope::{from_line, to_line, SignedMessage};
use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use fc_common::logger::{log, Logger};
use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// How frequently to send keepalive pings.
pub const KEEPALIVE: Duration = Duration::from_secs(10);

/// Outbound messages queued beyond this are dropped.
const OUTBOX_CAPACITY: usize = 100;

/// A BasicConnection represents a two-way message channel.
///
/// You can close it at any point, and it closes itself when it detects
/// network problems. Inbound messages go to the shared inbox channel the
/// connection was created with; outbound messages are queued with `send` and
/// written by a dedicated thread, interleaved with keepalive blank lines.
pub struct BasicConnection {
    outbox: Sender<SignedMessage>,
    quit: Sender<()>,
    closed: Arc<AtomicBool>,
}

impl BasicConnection {
    /// Create a new logical connection given a network connection.
    /// `inbox` is the channel to deliver received messages to.
    pub fn new(
        stream: TcpStream,
        inbox: Sender<SignedMessage>,
        logger: Logger,
    ) -> std::io::Result<Self> {
        let (outbox_tx, outbox_rx) = bounded::<SignedMessage>(OUTBOX_CAPACITY);
        let (quit_tx, quit_rx) = bounded::<()>(1);
        let closed = Arc::new(AtomicBool::new(false));

        let read_stream = stream.try_clone()?;
        // A peer that goes quiet misses keepalives; give up after two
        // periods without traffic.
        read_stream.set_read_timeout(Some(2 * KEEPALIVE))?;

        {
            let closed = Arc::clone(&closed);
            let logger = logger.clone();
            thread::spawn(move || {
                Self::run_incoming(read_stream, inbox, closed, logger);
            });
        }
        {
            let closed = Arc::clone(&closed);
            thread::spawn(move || {
                Self::run_outgoing(stream, outbox_rx, quit_rx, closed, logger);
            });
        }

        Ok(Self {
            outbox: outbox_tx,
            quit: quit_tx,
            closed,
        })
    }

    fn run_incoming(
        stream: TcpStream,
        inbox: Sender<SignedMessage>,
        closed: Arc<AtomicBool>,
        logger: Logger,
    ) {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            let result = reader.read_line(&mut line);
            if closed.load(Ordering::SeqCst) {
                break;
            }
            match result {
                Ok(0) => {
                    log::debug!(logger, "connection closed by peer");
                    closed.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => match from_line(&line) {
                    Ok(None) => {
                        // Keepalive.
                    }
                    Ok(Some(message)) => {
                        if inbox.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!(logger, "dropping unreadable frame: {}", e);
                    }
                },
                Err(e) => {
                    log::debug!(logger, "connection error: {}", e);
                    closed.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    fn run_outgoing(
        mut stream: TcpStream,
        outbox: Receiver<SignedMessage>,
        quit: Receiver<()>,
        closed: Arc<AtomicBool>,
        logger: Logger,
    ) {
        loop {
            let keepalive = after(KEEPALIVE);
            let line = select! {
                recv(quit) -> _ => break,
                recv(outbox) -> message => match message {
                    Ok(message) => to_line(&message),
                    Err(_) => break,
                },
                recv(keepalive) -> _ => "\n".to_string(),
            };
            if stream.write_all(line.as_bytes()).is_err() {
                log::debug!(logger, "write failed, closing connection");
                closed.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    /// Queue a message, but only if the outbox is not full.
    /// Returns whether the message was queued.
    pub fn send(&self, message: SignedMessage) -> bool {
        self.outbox.try_send(message).is_ok()
    }

    /// Ask both threads to stop. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.quit.try_send(());
    }

    /// Whether the connection has been closed, by us or by the network.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for BasicConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod connection_tests {
    use super::*;
    use crate::{envelope::seal, message::NodeMessage};
    use crossbeam_channel::unbounded;
    use fc_common::{keys::KeyPair, logger::create_null_logger};
    use fc_consensus_scp::{NominationMessage, QuorumSlice, SlotValue};
    use std::net::TcpListener;

    fn sample_message() -> NodeMessage {
        NodeMessage::Nomination(NominationMessage {
            I: 1,
            X: vec![SlotValue::new("chunk".to_string())],
            Y: vec![],
            D: QuorumSlice::new(1, vec![KeyPair::from_secret_phrase("peer").node_id()]),
        })
    }

    #[test]
    fn messages_cross_a_socket_pair() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client_stream = TcpStream::connect(addr).unwrap();
        let (server_stream, _) = listener.accept().unwrap();

        let (client_inbox_tx, _client_inbox) = unbounded();
        let (server_inbox_tx, server_inbox) = unbounded();

        let client =
            BasicConnection::new(client_stream, client_inbox_tx, create_null_logger()).unwrap();
        let _server =
            BasicConnection::new(server_stream, server_inbox_tx, create_null_logger()).unwrap();

        let kp = KeyPair::from_secret_phrase("sender");
        let signed = seal(&kp, &sample_message());
        assert!(client.send(signed.clone()));

        let received = server_inbox
            .recv_timeout(Duration::from_secs(5))
            .expect("message never arrived");
        assert_eq!(received, signed);

        client.close();
        assert!(client.is_closed());
    }
}
