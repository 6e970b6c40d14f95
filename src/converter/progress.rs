/// Snapshot of one conversion attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionProgress {
    pub status: String,
    pub progress: f32,
    pub is_complete: bool,
    pub is_error: bool,
    pub error_message: Option<String>,
    pub warning_count: usize,
    pub error_count: usize,
    pub warnings: Vec<String>,
}

impl ConversionProgress {
    pub fn new() -> Self {
        Self {
            status: "Initializing...".to_string(),
            progress: 0.0,
            is_complete: false,
            is_error: false,
            error_message: None,
            warning_count: 0,
            error_count: 0,
            warnings: Vec::new(),
        }
    }

    /// `None` leaves the fraction untouched.
    pub fn update(&mut self, status: impl Into<String>, progress: Option<f32>) {
        self.status = status.into();
        if let Some(p) = progress {
            self.progress = p.clamp(0.0, 1.0);
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warning_count += 1;
        self.warnings.push(message.into());
    }

    pub fn complete(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.progress = 1.0;
        self.is_complete = true;
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = format!("Error: {message}");
        self.is_complete = true;
        self.is_error = true;
        self.error_message = Some(message);
        self.error_count += 1;
    }

    /// `status` with the running warning and error counts appended.
    pub fn with_counts(&self, status: &str) -> String {
        format!(
            "{status} | Warnings: {}, Errors: {}",
            self.warning_count, self.error_count
        )
    }
}

impl Default for ConversionProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clamps_fraction() {
        let mut p = ConversionProgress::new();
        p.update("way over", Some(3.0));
        assert_eq!(p.progress, 1.0);
        p.update("below", Some(-1.0));
        assert_eq!(p.progress, 0.0);
        p.update("unchanged", None);
        assert_eq!(p.progress, 0.0);
        assert_eq!(p.status, "unchanged");
    }

    #[test]
    fn error_marks_complete_and_prefixes_status() {
        let mut p = ConversionProgress::new();
        p.error("boom");
        assert!(p.is_complete && p.is_error);
        assert_eq!(p.status, "Error: boom");
        assert_eq!(p.error_message.as_deref(), Some("boom"));
        assert_eq!(p.error_count, 1);
    }

    #[test]
    fn counts_suffix() {
        let mut p = ConversionProgress::new();
        p.add_warning("odd table");
        assert_eq!(p.with_counts("Converting..."), "Converting... | Warnings: 1, Errors: 0");
    }
}
