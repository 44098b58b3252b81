use super::archive::ArchiveReport;

pub trait ProgressCallback: Send {
    fn on_search_start(&mut self, algorithm: &str);
    fn on_evaluation(&mut self, evaluations: u64, covered_targets: usize);
    fn on_search_complete(&mut self, report: &ArchiveReport);
}

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_search_start(&mut self, algorithm: &str) {
        println!("Starting {} search...", algorithm);
    }

    fn on_evaluation(&mut self, evaluations: u64, covered_targets: usize) {
        if evaluations % 100 == 0 {
            println!("  Evaluated {} individuals, {} targets covered", evaluations, covered_targets);
        }
    }

    fn on_search_complete(&mut self, report: &ArchiveReport) {
        println!(
            "Search complete. Covered targets: {}, open targets: {}",
            report.covered_targets, report.open_targets
        );
    }
}

// For reporting to another thread
pub struct IpcProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone)]
pub enum ProgressMessage {
    SearchStart(String),
    Evaluation { evaluations: u64, covered_targets: usize },
    SearchComplete(ArchiveReport),
}

impl IpcProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for IpcProgressCallback {
    fn on_search_start(&mut self, algorithm: &str) {
        let _ = self.sender.send(ProgressMessage::SearchStart(algorithm.to_string()));
    }

    fn on_evaluation(&mut self, evaluations: u64, covered_targets: usize) {
        let _ = self.sender.send(ProgressMessage::Evaluation {
            evaluations,
            covered_targets,
        });
    }

    fn on_search_complete(&mut self, report: &ArchiveReport) {
        let _ = self.sender.send(ProgressMessage::SearchComplete(report.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipc_callback_forwards_messages() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut callback = IpcProgressCallback::new(tx);
        callback.on_search_start("MIO");
        callback.on_evaluation(3, 1);
        callback.on_search_complete(&ArchiveReport {
            covered_targets: 1,
            open_targets: 0,
            covered_by_seeded_tests: 0,
            targets: Vec::new(),
        });

        let messages: Vec<ProgressMessage> = rx.try_iter().collect();
        assert_eq!(messages.len(), 3);
        assert!(matches!(&messages[0], ProgressMessage::SearchStart(name) if name == "MIO"));
        assert!(matches!(
            messages[1],
            ProgressMessage::Evaluation { evaluations: 3, covered_targets: 1 }
        ));
        assert!(matches!(&messages[2], ProgressMessage::SearchComplete(r) if r.covered_targets == 1));
    }
}
