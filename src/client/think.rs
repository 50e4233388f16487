//! Reasoning marker splitter for assistant output
//!
//! Separates `<think>...</think>` spans from the visible answer. Works
//! token by token: a marker split across two tokens is held back until the
//! next token decides whether it really is a marker.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Which buffer a piece of text belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Visible answer text
    Content,
    /// Reasoning text, displayed separately
    Thinking,
}

/// A run of text routed to one buffer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Content,
            text: text.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Thinking,
            text: text.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SplitterState {
    Outside,
    InsideThinking,
}

/// Streaming splitter for reasoning markers
#[derive(Clone, Debug)]
pub struct ThinkSplitter {
    state: SplitterState,

    /// Tail of the previous token that could be the start of a marker
    pending_marker: String,
}

impl Default for ThinkSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThinkSplitter {
    pub fn new() -> Self {
        Self {
            state: SplitterState::Outside,
            pending_marker: String::new(),
        }
    }

    pub fn reset(&mut self) {
        self.state = SplitterState::Outside;
        self.pending_marker.clear();
    }

    /// Feed one token and get the text it resolves, in order.
    ///
    /// Adjacent text of the same kind is merged; empty runs are never
    /// returned.
    pub fn feed(&mut self, token: &str) -> Vec<Segment> {
        let mut segments = Vec::new();

        let combined = format!("{}{}", self.pending_marker, token);
        self.pending_marker.clear();

        let mut rest = combined.as_str();
        loop {
            let marker = self.expected_marker();

            if let Some(pos) = rest.find(marker) {
                self.emit(&mut segments, &rest[..pos]);
                rest = &rest[pos + marker.len()..];
                self.state = match self.state {
                    SplitterState::Outside => SplitterState::InsideThinking,
                    SplitterState::InsideThinking => SplitterState::Outside,
                };
                continue;
            }

            let held = partial_marker_len(rest, marker);
            let split = rest.len() - held;
            self.emit(&mut segments, &rest[..split]);
            self.pending_marker.push_str(&rest[split..]);
            break;
        }

        segments
    }

    /// Release any held-back text once the stream has ended.
    pub fn flush(&mut self) -> Option<Segment> {
        if self.pending_marker.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.pending_marker);
        Some(Segment {
            kind: self.current_kind(),
            text,
        })
    }

    /// Check if currently inside a thinking segment
    pub fn is_inside_thinking(&self) -> bool {
        self.state == SplitterState::InsideThinking
    }

    fn expected_marker(&self) -> &'static str {
        match self.state {
            SplitterState::Outside => THINK_OPEN,
            SplitterState::InsideThinking => THINK_CLOSE,
        }
    }

    fn current_kind(&self) -> SegmentKind {
        match self.state {
            SplitterState::Outside => SegmentKind::Content,
            SplitterState::InsideThinking => SegmentKind::Thinking,
        }
    }

    fn emit(&self, segments: &mut Vec<Segment>, text: &str) {
        if text.is_empty() {
            return;
        }
        let kind = self.current_kind();
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => segments.push(Segment {
                kind,
                text: text.to_string(),
            }),
        }
    }
}

/// Length of the longest proper prefix of `marker` that `text` ends with.
///
/// Markers are ASCII, so the returned split point is always a char boundary.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}

/// Split a complete response into visible answer and reasoning.
///
/// Reasoning spans are trimmed and joined with blank lines; the answer is
/// trimmed. Returns `None` for reasoning when the response had no spans.
pub fn split_complete(response: &str) -> (String, Option<String>) {
    let mut splitter = ThinkSplitter::new();
    let mut segments = splitter.feed(response);
    segments.extend(splitter.flush());

    let mut content = String::new();
    let mut thinking = Vec::new();
    for segment in segments {
        match segment.kind {
            SegmentKind::Content => content.push_str(&segment.text),
            SegmentKind::Thinking => thinking.push(segment.text.trim().to_string()),
        }
    }

    let thinking = if thinking.is_empty() {
        None
    } else {
        Some(thinking.join("\n\n"))
    };

    (content.trim().to_string(), thinking)
}
