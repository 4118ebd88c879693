// Copyright (c) 2017-2026 quantenschaum <software@louisenhof2.de>
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Client for the Music Player Daemon.
//!
//! `Mpd` speaks the MPD text protocol over TCP. MPD closes idle connections
//! after a while, so `Mpd` remembers where it connected to, and reconnects
//! once when a command fails because the connection was lost.
//!
//! Besides sending raw commands, `Mpd` offers a few helpers for volume
//! control with an upper limit, toggling playback and managing playlists.
//!
//! ```no_run
//! use piripherals::mpd::{Mpd, Volume, PORT};
//!
//! # fn main() -> piripherals::mpd::Result<()> {
//! let mut mpd = Mpd::new(80);
//! mpd.connect("localhost", PORT)?;
//!
//! mpd.set_volume(Volume::Relative(5))?;
//! mpd.toggle_play()?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::error;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::result;
use std::str::FromStr;
use std::time::Duration;

/// Default MPD port.
pub const PORT: u16 = 6600;

/// Default read, write and connect timeout.
pub const TIMEOUT: Duration = Duration::from_secs(5);

const GREETING: &str = "OK MPD ";

/// Errors that can occur when talking to MPD.
#[derive(Debug)]
pub enum Error {
    /// I/O error, usually a lost connection.
    Io(io::Error),
    /// MPD sent something unexpected.
    Protocol(String),
    /// MPD rejected a command with an `ACK` response.
    Command {
        code: u32,
        command: String,
        message: String,
    },
    /// Not connected, and no previous connection to restore.
    NotConnected,
    /// The volume isn't a number, optionally prefixed with `+` or `-`.
    InvalidVolume(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "I/O error: {}", err),
            Error::Protocol(ref line) => write!(f, "Unexpected response: {}", line),
            Error::Command {
                code,
                ref command,
                ref message,
            } => write!(f, "Command {} failed ({}): {}", command, code, message),
            Error::NotConnected => write!(f, "Not connected"),
            Error::InvalidVolume(ref volume) => write!(f, "Invalid volume: {}", volume),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

/// Result type returned from methods that can have `mpd::Error`s.
pub type Result<T> = result::Result<T, Error>;

/// A volume change.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Volume {
    /// Set the volume to this value.
    Absolute(i32),
    /// Change the volume by this amount.
    Relative(i32),
}

/// Parses `"42"` as an absolute, and `"+3"` or `"-7"` as a relative volume.
pub fn parse_volume(s: &str) -> Result<Volume> {
    let s = s.trim();
    let invalid = || Error::InvalidVolume(s.to_owned());

    if s.starts_with('+') || s.starts_with('-') {
        s.parse::<i32>().map(Volume::Relative).map_err(|_| invalid())
    } else {
        s.parse::<i32>().map(Volume::Absolute).map_err(|_| invalid())
    }
}

impl FromStr for Volume {
    type Err = Error;

    fn from_str(s: &str) -> Result<Volume> {
        parse_volume(s)
    }
}

/// Playback state.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum State {
    Play,
    Pause,
    Stop,
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<State> {
        match s {
            "play" => Ok(State::Play),
            "pause" => Ok(State::Pause),
            "stop" => Ok(State::Stop),
            _ => Err(Error::Protocol(format!("state: {}", s))),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            State::Play => write!(f, "play"),
            State::Pause => write!(f, "pause"),
            State::Stop => write!(f, "stop"),
        }
    }
}

// Arguments are always quoted, so they may contain spaces
fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');

    quoted
}

// ACK [code@index] {command} message
fn parse_ack(line: &str) -> Error {
    let protocol = || Error::Protocol(line.to_owned());

    let parsed = line
        .strip_prefix("ACK [")
        .and_then(|rest| rest.split_once(']'))
        .and_then(|(error, rest)| {
            let code = error.split('@').next()?.parse().ok()?;
            let (command, message) = rest.trim_start().strip_prefix('{')?.split_once('}')?;

            Some(Error::Command {
                code,
                command: command.to_owned(),
                message: message.trim().to_owned(),
            })
        });

    parsed.unwrap_or_else(protocol)
}

#[derive(Debug)]
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    version: String,
}

impl Connection {
    fn open(host: &str, port: u16, timeout: Duration) -> Result<Connection> {
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "no address");
        let mut stream = None;

        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = e,
            }
        }

        let writer = stream.ok_or(last_error)?;
        writer.set_read_timeout(Some(timeout))?;
        writer.set_write_timeout(Some(timeout))?;

        let mut connection = Connection {
            reader: BufReader::new(writer.try_clone()?),
            writer,
            version: String::new(),
        };

        let greeting = connection.read_line()?;
        match greeting.strip_prefix(GREETING) {
            Some(version) => connection.version = version.to_owned(),
            None => return Err(Error::Protocol(greeting)),
        }

        Ok(connection)
    }

    fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.writer.set_read_timeout(Some(timeout))?;
        self.writer.set_write_timeout(Some(timeout))?;

        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }

        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_owned())
    }

    fn command(&mut self, cmd: &str, args: &[&str]) -> Result<Vec<(String, String)>> {
        let mut line = String::from(cmd);
        for arg in args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line.push('\n');

        self.writer.write_all(line.as_bytes())?;

        let mut pairs = Vec::new();
        loop {
            let line = self.read_line()?;

            if line == "OK" {
                return Ok(pairs);
            }

            if line.starts_with("ACK ") {
                return Err(parse_ack(&line));
            }

            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_owned(), value.to_owned())),
                None => return Err(Error::Protocol(line)),
            }
        }
    }
}

/// MPD client with automatic reconnect and a volume limit.
#[derive(Debug)]
pub struct Mpd {
    max_volume: i32,
    timeout: Duration,
    target: Option<(String, u16)>,
    connection: Option<Connection>,
}

impl Default for Mpd {
    fn default() -> Mpd {
        Mpd::new(100)
    }
}

impl Mpd {
    /// Constructs a new, unconnected `Mpd`.
    ///
    /// [`set_volume`] never sets the volume above `max_volume`. The value
    /// is taken as is, MPD itself rejects volumes above 100.
    ///
    /// [`set_volume`]: #method.set_volume
    pub fn new(max_volume: i32) -> Mpd {
        Mpd {
            max_volume,
            timeout: TIMEOUT,
            target: None,
            connection: None,
        }
    }

    pub fn max_volume(&self) -> i32 {
        self.max_volume
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the connect, read and write timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;

        if let Some(connection) = &self.connection {
            connection.set_timeout(timeout)?;
        }

        Ok(())
    }

    /// Connects to MPD at `host`:`port`, and remembers it for reconnects.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.disconnect();
        self.target = Some((host.to_owned(), port));

        let connection = Connection::open(host, port, self.timeout)?;
        log::debug!("Connected to MPD {} at {}:{}", connection.version, host, port);
        self.connection = Some(connection);

        Ok(())
    }

    /// Closes the connection, and forgets where it went.
    pub fn disconnect(&mut self) {
        self.target = None;

        if let Some(mut connection) = self.connection.take() {
            let _ = connection.writer.write_all(b"close\n");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Returns the protocol version announced by the server.
    pub fn version(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.version.as_str())
    }

    fn reconnect(&mut self) -> Result<()> {
        let (host, port) = self.target.clone().ok_or(Error::NotConnected)?;
        log::debug!("Reconnecting to MPD at {}:{}", host, port);

        self.connection = None;
        self.connection = Some(Connection::open(&host, port, self.timeout)?);

        Ok(())
    }

    fn try_command(&mut self, cmd: &str, args: &[&str]) -> Result<Vec<(String, String)>> {
        let connection = self.connection.as_mut().ok_or(Error::NotConnected)?;

        match connection.command(cmd, args) {
            Err(Error::Io(e)) => {
                self.connection = None;
                Err(Error::Io(e))
            }
            result => result,
        }
    }

    /// Sends `cmd` with `args`, and returns the response as key/value pairs.
    ///
    /// If the connection was lost, `command` reconnects once and retries.
    pub fn command(&mut self, cmd: &str, args: &[&str]) -> Result<Vec<(String, String)>> {
        match self.try_command(cmd, args) {
            Err(Error::Io(_)) | Err(Error::NotConnected) if self.target.is_some() => {
                self.reconnect()?;
                self.try_command(cmd, args)
            }
            result => result,
        }
    }

    fn values(&mut self, cmd: &str, args: &[&str], key: &str) -> Result<Vec<String>> {
        Ok(self
            .command(cmd, args)?
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect())
    }

    /// Returns the player status.
    pub fn status(&mut self) -> Result<HashMap<String, String>> {
        Ok(self.command("status", &[])?.into_iter().collect())
    }

    fn status_value(&mut self, key: &str) -> Result<String> {
        self.status()?
            .remove(key)
            .ok_or_else(|| Error::Protocol(format!("status without {}", key)))
    }

    /// Returns the current volume.
    pub fn volume(&mut self) -> Result<i32> {
        let volume = self.status_value("volume")?;

        volume
            .parse()
            .map_err(|_| Error::Protocol(format!("volume: {}", volume)))
    }

    /// Changes the volume, limited to `max_volume` and then to at least 0.
    /// Returns the new volume.
    pub fn set_volume(&mut self, volume: Volume) -> Result<i32> {
        let volume = match volume {
            Volume::Absolute(v) => v,
            Volume::Relative(dv) => self.volume()? + dv,
        }
        .min(self.max_volume)
        .max(0);

        self.command("setvol", &[&volume.to_string()])?;

        Ok(volume)
    }

    pub fn state(&mut self) -> Result<State> {
        self.status_value("state")?.parse()
    }

    pub fn play(&mut self) -> Result<()> {
        self.command("play", &[]).map(drop)
    }

    pub fn pause(&mut self) -> Result<()> {
        self.command("pause", &["1"]).map(drop)
    }

    pub fn stop(&mut self) -> Result<()> {
        self.command("stop", &[]).map(drop)
    }

    /// Starts playback when stopped, pauses otherwise.
    pub fn toggle_play(&mut self) -> Result<()> {
        if self.state()? == State::Stop {
            self.play()
        } else {
            self.pause()
        }
    }

    /// Clears the queue.
    pub fn clear(&mut self) -> Result<()> {
        self.command("clear", &[]).map(drop)
    }

    /// Appends `uri` to the queue.
    pub fn add(&mut self, uri: &str) -> Result<()> {
        self.command("add", &[uri]).map(drop)
    }

    /// Returns the URIs in the queue.
    pub fn playlist(&mut self) -> Result<Vec<String>> {
        Ok(self
            .command("playlist", &[])?
            .into_iter()
            .map(|(_, uri)| uri)
            .collect())
    }

    /// Returns the names of the stored playlists.
    pub fn list_playlists(&mut self) -> Result<Vec<String>> {
        self.values("listplaylists", &[], "playlist")
    }

    pub fn has_playlist(&mut self, name: &str) -> Result<bool> {
        Ok(self.list_playlists()?.iter().any(|p| p == name))
    }

    /// Stores the queue as playlist `name`, replacing an existing one.
    pub fn save_playlist(&mut self, name: &str) -> Result<()> {
        self.del_playlist(name)?;
        self.command("save", &[name]).map(drop)
    }

    /// Deletes playlist `name`. A missing playlist isn't an error.
    pub fn del_playlist(&mut self, name: &str) -> Result<()> {
        match self.command("rm", &[name]) {
            Ok(_) | Err(Error::Command { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Replaces the queue with playlist `name`, if it exists.
    ///
    /// Returns `false` if there's no such playlist.
    pub fn load_playlist(&mut self, name: &str) -> Result<bool> {
        if !self.has_playlist(name)? {
            return Ok(false);
        }

        self.clear()?;
        self.command("load", &[name])?;

        Ok(true)
    }
}

impl Drop for Mpd {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_are_quoted() {
        assert_eq!(quote("foo"), "\"foo\"");
        assert_eq!(quote("a \"b\" \\c"), "\"a \\\"b\\\" \\\\c\"");
    }

    #[test]
    fn ack_lines() {
        match parse_ack("ACK [50@0] {rm} No such playlist") {
            Error::Command {
                code,
                command,
                message,
            } => {
                assert_eq!(code, 50);
                assert_eq!(command, "rm");
                assert_eq!(message, "No such playlist");
            }
            e => panic!("unexpected {:?}", e),
        }

        assert!(matches!(parse_ack("ACK nonsense"), Error::Protocol(_)));
    }

    #[test]
    fn volumes() {
        assert_eq!(parse_volume("42").unwrap(), Volume::Absolute(42));
        assert_eq!(parse_volume("+3").unwrap(), Volume::Relative(3));
        assert_eq!("-7".parse::<Volume>().unwrap(), Volume::Relative(-7));
        assert!(matches!(parse_volume("loud"), Err(Error::InvalidVolume(_))));
    }

    #[test]
    fn not_connected() {
        let mut mpd = Mpd::default();

        assert!(!mpd.is_connected());
        assert!(matches!(mpd.status(), Err(Error::NotConnected)));
    }

    #[test]
    fn max_volume_is_kept() {
        assert_eq!(Mpd::default().max_volume(), 100);
        assert_eq!(Mpd::new(150).max_volume(), 150);
        assert_eq!(Mpd::new(-5).max_volume(), -5);
    }
}
