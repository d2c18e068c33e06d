//! Orchestration of the control session, the audio relay and the player,
//! plus the interactive prompt that drives them.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use mpd_proto::Reply;

use crate::command::UserCommand;
use crate::config::AppConfig;
use crate::display::{HELP, render_banner, render_playlist, render_search_results};
use crate::fifo::FifoPaths;
use crate::player::ExternalPlayer;
use crate::remote::{ControlSession, PlayState, SessionError};
use crate::streamer::Streamer;

const PROMPT: &str = ">> ";
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

pub struct RemoteStreamer {
    config: AppConfig,
    remote: ControlSession,
    streamer: Streamer,
    player: ExternalPlayer,
    fifos: FifoPaths,
    message: Option<String>,
}

impl RemoteStreamer {
    /// Create the pipes, connect to MPD and, if it is already playing, start
    /// the local stream. Everything set up so far is torn down on failure.
    pub fn start(config: AppConfig) -> Result<Self> {
        let fifos = config.fifos.clone();
        fifos.create()?;

        let mut remote = ControlSession::new(config.remote.clone());
        if let Err(e) = remote.connect() {
            fifos.remove();
            return Err(e).context("connect to mpd");
        }

        let mut app = Self {
            streamer: Streamer::spawn(config.streamer.clone()),
            player: ExternalPlayer::new(config.player.clone()),
            remote,
            fifos,
            config,
            message: None,
        };
        if let Err(e) = app.resume_if_playing() {
            app.shutdown();
            return Err(e);
        }
        Ok(app)
    }

    fn resume_if_playing(&mut self) -> Result<()> {
        self.remote.refresh_status()?;
        if self.remote.status().play_state() != Some(PlayState::Play) {
            return Ok(());
        }
        self.player.play()?;
        if !self.streamer.play().connected {
            bail!(
                "could not connect to the http stream server at {}",
                self.config.streamer.addr
            );
        }
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        if self.remote.status().playlist_len() == Some(0) {
            self.message = Some(" (nothing to play!)".to_string());
            return Ok(());
        }
        if self.remote.status().play_state() != Some(PlayState::Play) {
            let reply = self.remote.play()?;
            self.report(&reply);
            // The httpd output only serves a stream once mpd is playing.
            if !self.streamer.is_connected() {
                std::thread::sleep(self.config.stream_start_delay);
            }
        }
        self.player.play()?;
        self.start_stream();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.player.pause()?;
        let reply = self.remote.pause()?;
        self.report(&reply);
        self.streamer.pause();
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.streamer.stop();
        self.player.quit()?;
        let reply = self.remote.stop()?;
        self.report(&reply);
        Ok(())
    }

    pub fn previous(&mut self) -> Result<()> {
        self.skip(ControlSession::previous)
    }

    pub fn next(&mut self) -> Result<()> {
        self.skip(ControlSession::next)
    }

    /// Changing track makes mpd play, so the local side follows.
    fn skip(
        &mut self,
        command: fn(&mut ControlSession) -> Result<Reply, SessionError>,
    ) -> Result<()> {
        if self.remote.status().play_state() == Some(PlayState::Stop) {
            self.message = Some(" (playback stopped; can't do that)".to_string());
            return Ok(());
        }
        let reply = command(&mut self.remote)?;
        self.report(&reply);
        self.player.play()?;
        self.start_stream();
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.streamer.stop();
        self.player.quit()?;
        let reply = self.remote.clear()?;
        self.report(&reply);
        Ok(())
    }

    pub fn findadd(&mut self, query: &str) -> Result<()> {
        let reply = self.remote.findadd(query)?;
        self.report(&reply);
        Ok(())
    }

    pub fn find(&mut self, query: &str) -> Result<()> {
        let reply = self.remote.find(query)?;
        if reply.is_ok() {
            self.message = Some(render_search_results(&mpd_proto::parse_songs(reply.pairs())));
        } else {
            self.report(&reply);
        }
        Ok(())
    }

    pub fn playlist_info(&mut self) -> Result<()> {
        let reply = self.remote.playlist_info()?;
        if reply.is_ok() {
            self.message = Some(render_playlist(&mpd_proto::parse_songs(reply.pairs())));
        } else {
            self.report(&reply);
        }
        Ok(())
    }

    pub fn update(&mut self) -> Result<()> {
        let reply = self.remote.update()?;
        if reply.is_ok() {
            self.message = Some(" (database update started)".to_string());
        } else {
            self.report(&reply);
        }
        Ok(())
    }

    pub fn execute(&mut self, command: UserCommand) -> Result<()> {
        match command {
            UserCommand::Empty | UserCommand::Quit => {}
            UserCommand::Help => self.message = Some(HELP.to_string()),
            UserCommand::Play => self.play()?,
            UserCommand::Pause => self.pause()?,
            UserCommand::Stop => self.stop()?,
            UserCommand::Prev => self.previous()?,
            UserCommand::Next => self.next()?,
            UserCommand::Clear => self.clear()?,
            UserCommand::FindAdd(query) => self.findadd(&query)?,
            UserCommand::Find(query) => self.find(&query)?,
            UserCommand::PlaylistInfo => self.playlist_info()?,
            UserCommand::Update => self.update()?,
            UserCommand::Unknown(_) => {
                self.message =
                    Some("unrecognized command; type 'help' for available commands".to_string());
            }
        }
        Ok(())
    }

    /// Pending one-shot message, shown instead of the banner.
    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    fn start_stream(&mut self) {
        if !self.streamer.play().connected {
            self.message = Some(format!(
                " (could not reach the stream at {})",
                self.config.streamer.addr
            ));
        }
    }

    fn report(&mut self, reply: &Reply) {
        if !reply.is_ok() {
            self.message = Some(format!(" mpd: {}", reply.code));
        }
    }

    /// Run the prompt until `quit`, end of input or an interrupt, then shut down.
    pub fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let lines = spawn_stdin_reader();
        let mut out = io::stdout();
        loop {
            if let Err(e) = self.remote.wait() {
                tracing::warn!(error = %e, "waiting for mpd failed");
            }
            let screen = match self.take_message() {
                Some(message) => message,
                None => render_banner(self.remote.status()),
            };
            write!(out, "{screen}\n{PROMPT}")?;
            out.flush()?;

            let Some(line) = next_line(&lines, &shutdown) else {
                writeln!(out)?;
                break;
            };
            match UserCommand::parse(&line) {
                UserCommand::Quit => break,
                command => {
                    if let Err(e) = self.execute(command) {
                        tracing::debug!(error = ?e, "command failed");
                        self.message = Some(format!(" error: {e:#}"));
                    }
                }
            }
        }
        self.shutdown();
        writeln!(out, "bye!")?;
        Ok(())
    }

    /// The session goes first so the server stops pushing data, then the
    /// relay so the sink closes, then the player, then the pipes.
    pub fn shutdown(&mut self) {
        self.remote.quit();
        self.streamer.quit();
        if let Err(e) = self.player.quit() {
            tracing::warn!(error = %format!("{e:#}"), "player did not quit cleanly");
        }
        self.fifos.remove();
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Next input line; `None` at end of input or once shutdown is requested.
fn next_line(lines: &Receiver<String>, shutdown: &AtomicBool) -> Option<String> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return None;
        }
        match lines.recv_timeout(INTERRUPT_POLL) {
            Ok(line) => return Some(line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::{PlayerConfig, RemoteConfig, StreamerConfig};
    use crate::remote::testing::{FakeMpd, eventually};
    use crate::streamer::StreamPhase;
    use crate::streamer::testing::{Body, FakeOrigin, closed_addr, temp_path};
    use std::path::PathBuf;

    struct Rig {
        app: RemoteStreamer,
        fake: FakeMpd,
        sink: PathBuf,
        fifo_dir: PathBuf,
    }

    /// App wired to a fake mpd, a fake origin and `true` as the player. The
    /// relay writes to a regular file so nothing blocks on a pipe reader.
    fn rig(state: &str, stream_addr: String) -> Rig {
        let fake = FakeMpd::start(state);
        let fifo_dir = temp_path("app-fifos");
        std::fs::create_dir_all(&fifo_dir).unwrap();
        let fifos = FifoPaths::in_dir(&fifo_dir);
        let sink = temp_path("app-sink");
        std::fs::write(&sink, b"").unwrap();
        let config = AppConfig {
            remote: RemoteConfig::new(fake.addr_string()),
            streamer: StreamerConfig {
                buffer_threshold: 256,
                read_timeout: Duration::from_millis(20),
                ..StreamerConfig::new(stream_addr, sink.clone())
            },
            player: PlayerConfig {
                program: PathBuf::from("true"),
                control_fifo: fifos.control.clone(),
                sink_fifo: fifos.sink.clone(),
            },
            fifos,
            stream_start_delay: Duration::ZERO,
        };
        let app = RemoteStreamer::start(config).unwrap();
        Rig {
            app,
            fake,
            sink,
            fifo_dir,
        }
    }

    impl Rig {
        fn finish(mut self) {
            self.app.shutdown();
            assert!(!self.app.fifos.sink.exists());
            assert!(!self.app.fifos.control.exists());
            let _ = std::fs::remove_file(&self.sink);
            let _ = std::fs::remove_dir_all(&self.fifo_dir);
        }
    }

    #[test]
    fn play_from_stopped_starts_remote_and_stream() {
        let origin = FakeOrigin::start(200, b"", Body::Stream);
        let mut rig = rig("stop", origin.addr_string());
        assert!(rig.app.fifos.sink.exists());
        assert_eq!(origin.connections(), 0);

        rig.app.execute(UserCommand::Play).unwrap();
        assert_eq!(rig.fake.state(), "play");
        assert_eq!(rig.app.streamer.flags().phase(), StreamPhase::Writing);
        assert!(rig.app.take_message().is_none());
        assert!(rig.app.remote.wait_for(Duration::from_secs(2)).unwrap());
        assert_eq!(rig.app.remote.status().play_state(), Some(PlayState::Play));

        rig.app.execute(UserCommand::Stop).unwrap();
        assert_eq!(rig.fake.state(), "stop");
        assert_eq!(rig.app.streamer.flags().phase(), StreamPhase::Disconnected);
        rig.finish();
    }

    #[test]
    fn start_resumes_stream_when_server_is_playing() {
        let origin = FakeOrigin::start(200, b"", Body::Stream);
        let rig = rig("play", origin.addr_string());
        assert_eq!(rig.app.streamer.flags().phase(), StreamPhase::Writing);
        assert_eq!(origin.connections(), 1);
        rig.finish();
    }

    #[test]
    fn skipping_while_stopped_is_refused() {
        let mut rig = rig("stop", closed_addr());
        rig.app.execute(UserCommand::Next).unwrap();
        assert_eq!(
            rig.app.take_message().as_deref(),
            Some(" (playback stopped; can't do that)")
        );
        assert!(!rig.fake.commands().iter().any(|c| c == "next"));
        rig.finish();
    }

    #[test]
    fn play_with_empty_playlist_reports_nothing_to_play() {
        let mut rig = rig("stop", closed_addr());
        rig.app.execute(UserCommand::Clear).unwrap();
        assert!(rig.app.remote.wait_for(Duration::from_secs(2)).unwrap());
        assert_eq!(rig.app.remote.status().playlist_len(), Some(0));

        rig.app.execute(UserCommand::Play).unwrap();
        assert_eq!(rig.app.take_message().as_deref(), Some(" (nothing to play!)"));
        assert_eq!(rig.fake.state(), "stop");
        rig.finish();
    }

    #[test]
    fn listings_and_errors_become_messages() {
        let mut rig = rig("stop", closed_addr());
        rig.app.execute(UserCommand::Find("artist Someone".into())).unwrap();
        assert_eq!(
            rig.app.take_message().as_deref(),
            Some("Someone\t\tRecord\t\tFirst")
        );

        rig.app.execute(UserCommand::PlaylistInfo).unwrap();
        let listing = rig.app.take_message().unwrap();
        assert_eq!(listing.lines().count(), 2);

        rig.app.execute(UserCommand::Unknown("dance".into())).unwrap();
        assert!(rig.app.take_message().unwrap().contains("unrecognized command"));
        rig.finish();
    }

    #[test]
    fn unreachable_stream_is_reported_not_fatal() {
        let mut rig = rig("stop", closed_addr());
        rig.app.execute(UserCommand::Play).unwrap();
        assert!(rig.app.take_message().unwrap().contains("could not reach the stream"));
        assert!(eventually(Duration::from_secs(2), || rig.fake.state() == "play"));
        rig.finish();
    }
}
