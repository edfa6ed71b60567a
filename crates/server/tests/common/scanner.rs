//! Scanner test double.

use async_trait::async_trait;
use moada_server::lifecycle::{ScanVerdict, Scanner};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scanner returning a verdict chosen by the test.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct ScriptedScanner {
    verdict: Mutex<ScanVerdict>,
    scans: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedScanner {
    /// A scanner reporting every file clean.
    pub fn clean() -> Self {
        Self {
            verdict: Mutex::new(ScanVerdict::Clean),
            scans: AtomicUsize::new(0),
        }
    }

    /// Change the verdict for subsequent scans.
    pub fn set(&self, verdict: ScanVerdict) {
        *self.verdict.lock().unwrap() = verdict;
    }

    /// Number of scans performed so far.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scanner for ScriptedScanner {
    async fn scan(&self, path: &Path) -> ScanVerdict {
        assert!(path.is_file(), "scanner called without a staged file");
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.verdict.lock().unwrap().clone()
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
