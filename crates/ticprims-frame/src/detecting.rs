//! Stream reader wrapper that settles the protocol mode before handing out
//! frames.

use std::sync::Arc;

use bytes::Bytes;
use ticprims_transport::SerialTransport;
use tracing::{debug, warn};

use crate::detector::find_mode_from_frame_buffer;
use crate::error::{FrameError, Result};
use crate::mode::{Mode, ModeSelection};
use crate::reader::StreamReader;

/// A [`StreamReader`] paired with a mode selection.
///
/// With a fixed selection the mode is known up front. Under
/// [`ModeSelection::Auto`] each call to
/// [`ModeDetectingStream::auto_detect_mode`] reads one frame and inspects its
/// leading group; on failure the line speed is switched to the other mode's
/// baud rate for the next attempt. The frame used to settle the mode is kept
/// and returned by the next [`ModeDetectingStream::next_frame`].
pub struct ModeDetectingStream<T> {
    reader: Arc<StreamReader<T>>,
    selection: ModeSelection,
    resolved: Option<Mode>,
    probe: Mode,
    switch_baud: bool,
    stash: Option<Bytes>,
    detection_error: Option<FrameError>,
}

impl<T: SerialTransport> ModeDetectingStream<T> {
    pub fn new(reader: StreamReader<T>, selection: ModeSelection) -> Self {
        let probe = if reader.baud_rate() == Mode::Standard.baud_rate() {
            Mode::Standard
        } else {
            Mode::Historic
        };
        Self {
            reader: Arc::new(reader),
            selection,
            resolved: selection.fixed(),
            probe,
            switch_baud: true,
            stash: None,
            detection_error: None,
        }
    }

    /// Keep the transport's baud rate while probing.
    pub fn without_baud_switching(mut self) -> Self {
        self.switch_baud = false;
        self
    }

    /// Resolve the mode, reading at most one frame.
    ///
    /// Returns `None` when the frame could not be read within the reader's
    /// timeout or did not carry a recognizable leading group. A failed read
    /// also yields `None`; its error is kept for
    /// [`ModeDetectingStream::take_detection_error`].
    pub fn auto_detect_mode(&mut self) -> Option<Mode> {
        if let Some(mode) = self.resolved {
            return Some(mode);
        }
        self.detection_error = None;

        if self.switch_baud {
            if let Err(err) = self.reader.set_baud_rate(self.probe.baud_rate()) {
                warn!(port = %self.reader.port_name(), error = %err, "failed to switch baud rate");
            }
        }

        let detected = match self.reader.read() {
            Ok(Some(frame)) => match find_mode_from_frame_buffer(&frame) {
                Ok(Some(mode)) => Some((mode, frame)),
                Ok(None) | Err(_) => None,
            },
            Ok(None) => None,
            Err(err) => {
                debug!(port = %self.reader.port_name(), error = %err, "mode probe read failed");
                self.detection_error = Some(err);
                None
            }
        };

        match detected {
            Some((mode, frame)) => {
                debug!(port = %self.reader.port_name(), %mode, "detected mode");
                self.resolved = Some(mode);
                self.stash = Some(frame);
                Some(mode)
            }
            None => {
                self.probe = self.probe.other();
                None
            }
        }
    }

    /// Error raised by the read of the last unsuccessful probe, if any.
    pub fn take_detection_error(&mut self) -> Option<FrameError> {
        self.detection_error.take()
    }

    /// Next raw frame, starting with the one kept from mode detection.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>> {
        if let Some(frame) = self.stash.take() {
            return Ok(Some(frame));
        }
        self.reader.read()
    }

    /// Forget the detected mode. A fixed selection stays resolved.
    pub fn invalidate(&mut self) {
        self.resolved = self.selection.fixed();
        self.stash = None;
        self.detection_error = None;
    }

    pub fn resolved_mode(&self) -> Option<Mode> {
        self.resolved
    }

    pub fn selection(&self) -> ModeSelection {
        self.selection
    }

    /// Shared handle on the reader, for resetting or interrupting it from
    /// another thread.
    pub fn reader(&self) -> Arc<StreamReader<T>> {
        Arc::clone(&self.reader)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ticprims_transport::memory::{MemoryLine, MemoryTransport};
    use ticprims_transport::SerialSettings;

    use super::*;
    use crate::reader::ReaderConfig;

    const HISTORIC_FRAME: &[u8] = b"\x02\nADCO 031664001115 +\r\nPTEC TH.. >\r\x03";

    fn stream(line: &MemoryLine, selection: ModeSelection) -> ModeDetectingStream<MemoryTransport> {
        let reader = StreamReader::with_config(
            line.transport("mem0", SerialSettings::historic()),
            ReaderConfig {
                read_timeout: Some(Duration::from_millis(20)),
                poll_interval: Duration::from_millis(1),
                ..ReaderConfig::default()
            },
        );
        ModeDetectingStream::new(reader, selection)
    }

    #[test]
    fn fixed_selection_is_resolved_without_reading() {
        let line = MemoryLine::new();
        let mut stream = stream(&line, ModeSelection::Standard);
        assert_eq!(stream.auto_detect_mode(), Some(Mode::Standard));
        assert_eq!(line.open_count(), 0);

        stream.invalidate();
        assert_eq!(stream.resolved_mode(), Some(Mode::Standard));
    }

    #[test]
    fn auto_detects_historic_and_keeps_frame() {
        let line = MemoryLine::new();
        line.feed(HISTORIC_FRAME);
        let mut stream = stream(&line, ModeSelection::Auto);

        assert_eq!(stream.auto_detect_mode(), Some(Mode::Historic));
        assert_eq!(stream.resolved_mode(), Some(Mode::Historic));
        assert_eq!(stream.next_frame().unwrap().unwrap().as_ref(), HISTORIC_FRAME);
        assert!(stream.next_frame().unwrap().is_none());
    }

    #[test]
    fn failed_probe_alternates_baud_rate() {
        let line = MemoryLine::new();
        let mut stream = stream(&line, ModeSelection::Auto);

        assert_eq!(stream.auto_detect_mode(), None);
        assert_eq!(line.baud_rate(), 1200);
        assert_eq!(stream.auto_detect_mode(), None);
        assert_eq!(line.baud_rate(), 9600);
        assert_eq!(stream.auto_detect_mode(), None);
        assert_eq!(line.baud_rate(), 1200);
    }

    #[test]
    fn failed_detection_read_is_kept() {
        let line = MemoryLine::new();
        line.set_fail_open(true);
        let mut stream = stream(&line, ModeSelection::Auto);

        assert_eq!(stream.auto_detect_mode(), None);
        assert!(matches!(stream.take_detection_error(), Some(FrameError::Transport(_))));
        assert!(stream.take_detection_error().is_none());
    }

    #[test]
    fn silent_line_leaves_no_detection_error() {
        let line = MemoryLine::new();
        let mut stream = stream(&line, ModeSelection::Auto);
        assert_eq!(stream.auto_detect_mode(), None);
        assert!(stream.take_detection_error().is_none());
    }

    #[test]
    fn unknown_leading_group_is_not_a_mode() {
        let line = MemoryLine::new();
        line.feed(b"\x02\nPTEC TH.. >\r\x03");
        let mut stream = stream(&line, ModeSelection::Auto).without_baud_switching();
        assert_eq!(stream.auto_detect_mode(), None);
        assert_eq!(line.baud_rate(), 1200);
    }

    #[test]
    fn invalidate_forgets_auto_mode() {
        let line = MemoryLine::new();
        line.feed(HISTORIC_FRAME);
        let mut stream = stream(&line, ModeSelection::Auto);
        assert!(stream.auto_detect_mode().is_some());

        stream.invalidate();
        assert_eq!(stream.resolved_mode(), None);
        assert!(stream.next_frame().unwrap().is_none());
    }
}
