//! Fenced code tracking for line-oriented scanning.

/// Tracks whether a line sequence is inside a fenced code block.
///
/// Fences are runs of three or more backticks or tildes; the closing fence
/// uses the same character with a run at least as long and nothing after it.
#[derive(Debug, Default)]
pub(crate) struct FenceTracker {
    open: Option<(char, usize)>,
}

impl FenceTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_fence(&self) -> bool {
        self.open.is_some()
    }

    /// Feed the next line. Returns `true` for opening and closing fence lines.
    pub(crate) fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        match self.open {
            Some((ch, len)) => {
                let run = fence_run(trimmed, ch);
                let closes = run >= len && trimmed[run..].chars().all(char::is_whitespace);
                if closes {
                    self.open = None;
                }
                closes
            }
            None => {
                let Some(ch) = trimmed.chars().next().filter(|c| matches!(c, '`' | '~')) else {
                    return false;
                };
                let run = fence_run(trimmed, ch);
                // A backtick fence's info string may not contain backticks.
                if run < 3 || (ch == '`' && trimmed[run..].contains('`')) {
                    return false;
                }
                self.open = Some((ch, run));
                true
            }
        }
    }
}

fn fence_run(s: &str, ch: char) -> usize {
    s.chars().take_while(|&c| c == ch).count() * ch.len_utf8()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_close() {
        let mut tracker = FenceTracker::new();
        assert!(tracker.update("```mermaid\n"));
        assert!(tracker.in_fence());
        assert!(!tracker.update("graph TD;\n"));
        assert!(tracker.update("```\n"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_closing_needs_same_char_and_length() {
        let mut tracker = FenceTracker::new();
        tracker.update("````");
        assert!(!tracker.update("```"));
        assert!(!tracker.update("~~~~"));
        assert!(tracker.in_fence());
        assert!(tracker.update("`````"));
        assert!(!tracker.in_fence());
    }

    #[test]
    fn test_closing_fence_takes_no_info() {
        let mut tracker = FenceTracker::new();
        tracker.update("~~~");
        assert!(!tracker.update("~~~ rust"));
        assert!(tracker.update("  ~~~  \n"));
    }

    #[test]
    fn test_inline_code_is_not_a_fence() {
        let mut tracker = FenceTracker::new();
        assert!(!tracker.update("``code``"));
        assert!(!tracker.update("```a```"));
        assert!(!tracker.in_fence());
    }
}
