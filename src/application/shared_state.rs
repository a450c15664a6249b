use crate::domain::baseline::is_known_section;
use crate::infrastructure::error::InfraError;
use std::sync::Arc;
use tokio::sync::watch;

/// The section the dashboard and the editor both show.
///
/// Every view subscribes to the same channel, so a profile update or a manual
/// switch is seen everywhere without any view reading another's state.
#[derive(Debug, Clone)]
pub struct SharedSelection {
    sender: Arc<watch::Sender<String>>,
}

impl SharedSelection {
    pub fn new(initial_section: &str) -> Result<Self, InfraError> {
        let section = checked_section(initial_section)?;
        let (sender, _) = watch::channel(section);
        Ok(Self {
            sender: Arc::new(sender),
        })
    }

    pub fn current(&self) -> String {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.sender.subscribe()
    }

    /// Returns `true` when subscribers were notified.
    pub fn publish(&self, section: &str) -> Result<bool, InfraError> {
        let section = checked_section(section)?;
        let changed = self.sender.send_if_modified(|current| {
            if current.eq_ignore_ascii_case(&section) {
                return false;
            }
            *current = section.clone();
            true
        });
        if changed {
            tracing::debug!(%section, "selected section changed");
        }
        Ok(changed)
    }
}

fn checked_section(section: &str) -> Result<String, InfraError> {
    let section = section.trim();
    if !is_known_section(section) {
        return Err(InfraError::Validation(format!("unknown section: {section}")));
    }
    Ok(section.to_string())
}
