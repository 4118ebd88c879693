// Runs the MPD client against a small fake server on the loopback interface.
//
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

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use piripherals::mpd::{Error, Mpd, State, Volume};

#[derive(Debug, Default)]
struct Player {
    volume: i32,
    state: String,
    queue: Vec<String>,
    playlists: BTreeMap<String, Vec<String>>,
    commands: Vec<String>,
    connections: u32,
    drop_next: bool,
}

// Splits a command line into the command and its unquoted arguments
fn split(line: &str) -> (String, Vec<String>) {
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

    let mut args = Vec::new();
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        if c != '"' {
            continue;
        }

        let mut arg = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => arg.extend(chars.next()),
                '"' => break,
                _ => arg.push(c),
            }
        }
        args.push(arg);
    }

    (cmd.to_owned(), args)
}

fn respond(player: &mut Player, cmd: &str, args: &[String]) -> String {
    let arg = args.first().cloned().unwrap_or_default();

    match cmd {
        "status" => format!("volume: {}\nstate: {}\nOK\n", player.volume, player.state),
        "setvol" => {
            player.volume = arg.parse().unwrap();
            "OK\n".to_owned()
        }
        "play" | "stop" => {
            player.state = cmd.to_owned();
            "OK\n".to_owned()
        }
        "pause" => {
            player.state = "pause".to_owned();
            "OK\n".to_owned()
        }
        "clear" => {
            player.queue.clear();
            "OK\n".to_owned()
        }
        "add" => {
            player.queue.push(arg);
            "OK\n".to_owned()
        }
        "playlist" => {
            let mut response = String::new();
            for (i, uri) in player.queue.iter().enumerate() {
                response.push_str(&format!("{}:file: {}\n", i, uri));
            }
            response + "OK\n"
        }
        "listplaylists" => {
            let mut response = String::new();
            for name in player.playlists.keys() {
                response.push_str(&format!(
                    "playlist: {}\nLast-Modified: 2026-10-15T12:00:00Z\n",
                    name
                ));
            }
            response + "OK\n"
        }
        "save" if player.playlists.contains_key(&arg) => {
            "ACK [56@0] {save} Playlist already exists\n".to_owned()
        }
        "save" => {
            player.playlists.insert(arg, player.queue.clone());
            "OK\n".to_owned()
        }
        "rm" if player.playlists.remove(&arg).is_some() => "OK\n".to_owned(),
        "rm" => "ACK [50@0] {rm} No such playlist\n".to_owned(),
        "load" => match player.playlists.get(&arg) {
            Some(uris) => {
                player.queue.extend(uris.iter().cloned());
                "OK\n".to_owned()
            }
            None => "ACK [50@0] {load} No such playlist\n".to_owned(),
        },
        _ => format!("ACK [5@0] {{{}}} unknown command \"{}\"\n", cmd, cmd),
    }
}

fn serve(stream: TcpStream, player: Arc<Mutex<Player>>) {
    let mut writer = stream.try_clone().unwrap();
    writer.write_all(b"OK MPD 0.23.0\n").unwrap();

    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => return,
        };

        let (cmd, args) = split(&line);
        if cmd == "close" {
            return;
        }

        let response = {
            let mut player = player.lock().unwrap();
            if player.drop_next {
                player.drop_next = false;
                return;
            }

            player.commands.push(line.clone());
            respond(&mut player, &cmd, &args)
        };

        if writer.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

fn server() -> (u16, Arc<Mutex<Player>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let player = Arc::new(Mutex::new(Player {
        volume: 50,
        state: "stop".to_owned(),
        ..Player::default()
    }));

    let shared = player.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => return,
            };

            shared.lock().unwrap().connections += 1;
            let player = shared.clone();
            thread::spawn(move || serve(stream, player));
        }
    });

    (port, player)
}

fn client(max_volume: i32) -> (Mpd, Arc<Mutex<Player>>) {
    let (port, player) = server();

    let mut mpd = Mpd::new(max_volume);
    mpd.connect("127.0.0.1", port).unwrap();

    (mpd, player)
}

#[test]
fn greeting_and_status() {
    let (mut mpd, _player) = client(100);

    assert!(mpd.is_connected());
    assert_eq!(mpd.version(), Some("0.23.0"));

    let status = mpd.status().unwrap();
    assert_eq!(status["volume"], "50");
    assert_eq!(mpd.volume().unwrap(), 50);
    assert_eq!(mpd.state().unwrap(), State::Stop);
}

#[test]
fn volume_is_limited() {
    let (mut mpd, player) = client(80);

    assert_eq!(mpd.set_volume(Volume::Absolute(95)).unwrap(), 80);
    assert_eq!(mpd.set_volume(Volume::Relative(-100)).unwrap(), 0);
    assert_eq!(mpd.set_volume("+5".parse().unwrap()).unwrap(), 5);
    assert_eq!(mpd.volume().unwrap(), 5);

    let commands = player.lock().unwrap().commands.clone();
    let setvol: Vec<&String> = commands.iter().filter(|c| c.starts_with("setvol")).collect();
    assert_eq!(
        setvol,
        vec!["setvol \"80\"", "setvol \"0\"", "setvol \"5\""]
    );
}

#[test]
fn negative_limit_mutes() {
    let (mut mpd, _player) = client(-5);

    assert_eq!(mpd.max_volume(), -5);
    assert_eq!(mpd.set_volume(Volume::Absolute(40)).unwrap(), 0);
    assert_eq!(mpd.volume().unwrap(), 0);
}

#[test]
fn toggle_play_starts_and_pauses() {
    let (mut mpd, _player) = client(100);

    mpd.toggle_play().unwrap();
    assert_eq!(mpd.state().unwrap(), State::Play);

    mpd.toggle_play().unwrap();
    assert_eq!(mpd.state().unwrap(), State::Pause);

    mpd.stop().unwrap();
    assert_eq!(mpd.state().unwrap(), State::Stop);
}

#[test]
fn playlists() {
    let (mut mpd, player) = client(100);

    mpd.add("http://radio.example/stream").unwrap();
    mpd.add("music/some \"quoted\" song.mp3").unwrap();
    assert_eq!(
        mpd.playlist().unwrap(),
        vec![
            "http://radio.example/stream".to_owned(),
            "music/some \"quoted\" song.mp3".to_owned()
        ]
    );

    // Saving twice replaces the playlist
    mpd.save_playlist("mix").unwrap();
    mpd.save_playlist("mix").unwrap();
    assert!(mpd.has_playlist("mix").unwrap());
    assert_eq!(mpd.list_playlists().unwrap(), vec!["mix".to_owned()]);

    mpd.clear().unwrap();
    mpd.add("other").unwrap();
    assert!(mpd.load_playlist("mix").unwrap());
    assert_eq!(mpd.playlist().unwrap().len(), 2);

    assert!(!mpd.load_playlist("missing").unwrap());
    mpd.del_playlist("missing").unwrap();
    mpd.del_playlist("mix").unwrap();
    assert!(!mpd.has_playlist("mix").unwrap());

    assert!(player.lock().unwrap().playlists.is_empty());
}

#[test]
fn rejected_command() {
    let (mut mpd, _player) = client(100);

    match mpd.command("bogus", &[]) {
        Err(Error::Command {
            code,
            command,
            message,
        }) => {
            assert_eq!(code, 5);
            assert_eq!(command, "bogus");
            assert_eq!(message, "unknown command \"bogus\"");
        }
        result => panic!("unexpected {:?}", result),
    }

    // The connection is still usable
    assert_eq!(mpd.volume().unwrap(), 50);
}

#[test]
fn reconnects_once_after_lost_connection() {
    let (mut mpd, player) = client(100);

    player.lock().unwrap().drop_next = true;
    assert_eq!(mpd.volume().unwrap(), 50);

    assert_eq!(player.lock().unwrap().connections, 2);
}

#[test]
fn disconnect_forgets_server() {
    let (mut mpd, _player) = client(100);

    mpd.disconnect();
    assert!(!mpd.is_connected());
    assert!(matches!(mpd.status(), Err(Error::NotConnected)));
}
