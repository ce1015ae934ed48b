use log::{debug, info};

use crate::error::{Result, TranscriberError};
use crate::note::note_name;
use crate::types::{MidiEvent, MidiEventKind};

/// Destination for raw channel-voice messages.
pub trait MidiSink: Send {
    fn send(&mut self, message: [u8; 3]) -> Result<()>;

    /// Release the underlying port. Later sends fail.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: MidiSink + ?Sized> MidiSink for Box<T> {
    fn send(&mut self, message: [u8; 3]) -> Result<()> {
        (**self).send(message)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Single-voice MIDI writer.
///
/// Tracks the sounding note so that a note-on for a new note always sends
/// the previous note's off first. Never leaves two notes sounding.
pub struct MidiEmitter<S: MidiSink> {
    sink: S,
    sounding: Option<u8>,
    messages_sent: u64,
}

impl<S: MidiSink> MidiEmitter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sounding: None,
            messages_sent: 0,
        }
    }

    pub fn note_on(&mut self, note: u8, velocity: u8, timestamp_sec: f64) -> Result<()> {
        if let Some(prev) = self.sounding {
            self.note_off(prev, timestamp_sec)?;
        }
        self.write(MidiEvent::note_on(note, velocity, timestamp_sec))?;
        self.sounding = Some(note);
        Ok(())
    }

    pub fn note_off(&mut self, note: u8, timestamp_sec: f64) -> Result<()> {
        self.write(MidiEvent::note_off(note, timestamp_sec))?;
        if self.sounding == Some(note) {
            self.sounding = None;
        }
        Ok(())
    }

    /// Silence whatever is sounding. Returns the released note.
    pub fn release_all(&mut self, timestamp_sec: f64) -> Result<Option<u8>> {
        match self.sounding {
            Some(note) => {
                self.note_off(note, timestamp_sec)?;
                Ok(Some(note))
            }
            None => Ok(None),
        }
    }

    pub fn sounding(&self) -> Option<u8> {
        self.sounding
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub fn close(&mut self) -> Result<()> {
        self.sink.close()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn write(&mut self, event: MidiEvent) -> Result<()> {
        debug!("midi {}", event);
        self.sink.send(event.to_bytes())?;
        self.messages_sent += 1;
        Ok(())
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

/// Captures messages in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub messages: Vec<[u8; 3]>,
    pub closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded view of the captured messages (timestamps are not kept).
    pub fn events(&self) -> Vec<(MidiEventKind, u8)> {
        self.messages
            .iter()
            .map(|m| {
                let kind = if m[2] == 0 {
                    MidiEventKind::NoteOff
                } else {
                    MidiEventKind::NoteOn
                };
                (kind, m[1])
            })
            .collect()
    }
}

impl MidiSink for MemorySink {
    fn send(&mut self, message: [u8; 3]) -> Result<()> {
        if self.closed {
            return Err(TranscriberError::MidiWrite("sink closed".into()));
        }
        self.messages.push(message);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Logs each message instead of sending it anywhere (dry run).
#[derive(Debug, Default)]
pub struct LogSink {
    sent: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MidiSink for LogSink {
    fn send(&mut self, message: [u8; 3]) -> Result<()> {
        self.sent += 1;
        let kind = if message[2] == 0 { "off" } else { "on " };
        info!(
            "MIDI {} {:<4} [{:02X} {:02X} {:02X}]",
            kind,
            note_name(message[1] as i32),
            message[0],
            message[1],
            message[2]
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        info!("MIDI dry run: {} messages", self.sent);
        Ok(())
    }
}

#[cfg(feature = "live")]
pub use self::live::MidirSink;

#[cfg(feature = "live")]
mod live {
    use super::MidiSink;
    use crate::error::{Result, TranscriberError};
    use log::{info, warn};
    use midir::{MidiOutput, MidiOutputConnection};

    const CLIENT_NAME: &str = "pitch-to-midi";

    /// Hardware or virtual MIDI output port via midir.
    pub struct MidirSink {
        conn: Option<MidiOutputConnection>,
        port_name: String,
    }

    impl MidirSink {
        /// Names of all available output ports.
        pub fn list_ports() -> Result<Vec<String>> {
            let out = MidiOutput::new(CLIENT_NAME)
                .map_err(|e| TranscriberError::MidiOpen(e.to_string()))?;
            Ok(out
                .ports()
                .iter()
                .map(|p| out.port_name(p).unwrap_or_else(|_| "unknown".into()))
                .collect())
        }

        /// Open the first output port, or the first whose name contains `filter`.
        pub fn open(filter: Option<&str>) -> Result<Self> {
            let out = MidiOutput::new(CLIENT_NAME)
                .map_err(|e| TranscriberError::MidiOpen(e.to_string()))?;
            let ports = out.ports();
            if ports.is_empty() {
                return Err(TranscriberError::NoMidiOutput);
            }

            let port = match filter {
                Some(f) => ports
                    .iter()
                    .find(|p| out.port_name(p).map(|n| n.contains(f)).unwrap_or(false))
                    .cloned()
                    .ok_or_else(|| TranscriberError::MidiPortNotFound(f.to_string()))?,
                None => ports[0].clone(),
            };
            let port_name = out.port_name(&port).unwrap_or_else(|_| "unknown".into());
            info!("MIDI output: {}", port_name);

            let conn = out
                .connect(&port, "pitch-to-midi-out")
                .map_err(|e| TranscriberError::MidiOpen(e.to_string()))?;
            Ok(Self {
                conn: Some(conn),
                port_name,
            })
        }
    }

    impl MidiSink for MidirSink {
        fn send(&mut self, message: [u8; 3]) -> Result<()> {
            match self.conn.as_mut() {
                Some(conn) => conn
                    .send(&message)
                    .map_err(|e| TranscriberError::MidiWrite(e.to_string())),
                None => Err(TranscriberError::MidiWrite("port closed".into())),
            }
        }

        fn close(&mut self) -> Result<()> {
            if let Some(conn) = self.conn.take() {
                conn.close();
                info!("MIDI output {} closed", self.port_name);
            }
            Ok(())
        }
    }

    impl Drop for MidirSink {
        fn drop(&mut self) {
            if self.conn.is_some() {
                warn!("MIDI output {} dropped without close", self.port_name);
                let _ = self.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_clears_previous_note() {
        let mut em = MidiEmitter::new(MemorySink::new());
        em.note_on(69, 100, 0.0).unwrap();
        em.note_on(71, 100, 0.1).unwrap();
        assert_eq!(
            em.sink().messages,
            vec![[0x90, 69, 100], [0x90, 69, 0], [0x90, 71, 100]]
        );
        assert_eq!(em.sounding(), Some(71));
        assert_eq!(em.messages_sent(), 3);
    }

    #[test]
    fn test_release_all() {
        let mut em = MidiEmitter::new(MemorySink::new());
        assert_eq!(em.release_all(0.0).unwrap(), None);
        em.note_on(60, 90, 0.0).unwrap();
        assert_eq!(em.release_all(1.0).unwrap(), Some(60));
        assert_eq!(em.sounding(), None);
        assert_eq!(em.sink().events().last(), Some(&(MidiEventKind::NoteOff, 60)));
    }

    #[test]
    fn test_write_after_close_is_error() {
        let mut em = MidiEmitter::new(MemorySink::new());
        em.close().unwrap();
        let err = em.note_on(60, 100, 0.0).unwrap_err();
        assert!(matches!(err, TranscriberError::MidiWrite(_)));
        assert_eq!(em.sounding(), None, "failed note-on must not mark a note sounding");
    }
}
