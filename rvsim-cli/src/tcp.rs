//! A blocking, non-blocking-socket-backed [`Connection`]/[`ConnectionExt`] for the GDB stub.
//!
//! The stream is put into non-blocking mode so [`TcpStream::peek`] can be used to check for
//! incoming bytes without stalling the fetch-execute loop between GDB packets.

use std::io::{self, Read, Write};
use std::net::TcpStream as StdTcpStream;

use gdbstub::conn::{Connection, ConnectionExt};

pub struct TcpStream(pub StdTcpStream);

impl TcpStream {
    pub fn new(stream: StdTcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        Ok(Self(stream))
    }
}

impl Connection for TcpStream {
    type Error = io::Error;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.write_all(&[byte])
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.0.write_all(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush()
    }

    fn on_session_start(&mut self) -> Result<(), Self::Error> {
        self.0.set_nodelay(true)
    }
}

impl ConnectionExt for TcpStream {
    fn read(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        loop {
            match self.0.read_exact(&mut buf) {
                Ok(()) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut buf = [0u8; 1];
        match self.0.peek(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
