//! Per-stage counters and their compact status rendering.

/// Counters for one stage. `input` always equals `done + failed + rejected`;
/// `output` is independent (one directory can emit many files, a rejection emits none).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub done: usize,
    pub failed: usize,
    pub rejected: usize,
    pub input: usize,
    pub output: usize,
}

impl TaskStats {
    pub fn finish(&mut self, output_count: usize) {
        self.done += 1;
        self.input += 1;
        self.output += output_count;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
        self.input += 1;
    }

    pub fn reject(&mut self) {
        self.rejected += 1;
        self.input += 1;
    }

    /// Compact form: `[<in>>][<f>F][<r>R]<out>D`. The `<in>>` prefix only appears when input and output differ.
    pub fn compact(&self) -> String {
        let mut s = String::new();
        if self.input != self.output {
            s.push_str(&format!("{}>", self.input));
        }
        if self.failed > 0 {
            s.push_str(&format!("{}F", self.failed));
        }
        if self.rejected > 0 {
            s.push_str(&format!("{}R", self.rejected));
        }
        s.push_str(&format!("{}D", self.output));
        s
    }

    pub fn is_balanced(&self) -> bool {
        self.input == self.done + self.failed + self.rejected
    }
}
