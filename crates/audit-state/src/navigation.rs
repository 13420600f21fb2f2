//! # Navigation Session
//!
//! The current selection (matrix, engagement, control) travels as a
//! [`Session`] value. Each [`NavCommand`] consumes the session and returns
//! the next one, or an error when the command makes no sense from the
//! current view. A rejected command leaves the caller holding nothing, so
//! [`Session::apply`] hands the unchanged session back inside the error.

use audit_core::{Actor, ControlId, EngagementId, MatrixId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Screen the session is on, with the selection it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum View {
    MatrixList,
    MatrixBuilder {
        matrix: MatrixId,
    },
    EngagementList,
    EngagementWorkspace {
        engagement: EngagementId,
    },
    Testing {
        engagement: EngagementId,
        control: ControlId,
    },
    Review {
        engagement: EngagementId,
        control: ControlId,
    },
}

impl View {
    pub fn engagement(&self) -> Option<EngagementId> {
        match self {
            Self::EngagementWorkspace { engagement }
            | Self::Testing { engagement, .. }
            | Self::Review { engagement, .. } => Some(*engagement),
            _ => None,
        }
    }

    pub fn control(&self) -> Option<ControlId> {
        match self {
            Self::Testing { control, .. } | Self::Review { control, .. } => Some(*control),
            _ => None,
        }
    }

    pub fn matrix(&self) -> Option<MatrixId> {
        match self {
            Self::MatrixBuilder { matrix } => Some(*matrix),
            _ => None,
        }
    }
}

/// A navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum NavCommand {
    ShowMatrices,
    OpenMatrix { matrix: MatrixId },
    ShowEngagements,
    OpenEngagement { engagement: EngagementId },
    /// Open the testing workspace for a control of the current engagement.
    TestControl { control: ControlId },
    /// Open the reviewer workspace for a control of the current engagement.
    ReviewControl { control: ControlId },
    Back,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("no engagement selected")]
    NoEngagementSelected,
    #[error("nothing to go back to")]
    NoHistory,
}

/// Navigation state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub actor: Actor,
    view: View,
    #[serde(default)]
    history: Vec<View>,
}

impl Session {
    /// A session starting on the engagement list.
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            view: View::EngagementList,
            history: Vec::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Apply a command. On error the original session is returned alongside.
    pub fn apply(self, command: NavCommand) -> Result<Session, (Session, NavigationError)> {
        let next = match command {
            NavCommand::ShowMatrices => View::MatrixList,
            NavCommand::OpenMatrix { matrix } => View::MatrixBuilder { matrix },
            NavCommand::ShowEngagements => View::EngagementList,
            NavCommand::OpenEngagement { engagement } => View::EngagementWorkspace { engagement },
            NavCommand::TestControl { control } => match self.view.engagement() {
                Some(engagement) => View::Testing {
                    engagement,
                    control,
                },
                None => return Err((self, NavigationError::NoEngagementSelected)),
            },
            NavCommand::ReviewControl { control } => match self.view.engagement() {
                Some(engagement) => View::Review {
                    engagement,
                    control,
                },
                None => return Err((self, NavigationError::NoEngagementSelected)),
            },
            NavCommand::Back => return self.back(),
        };
        Ok(self.push(next))
    }

    fn push(mut self, next: View) -> Session {
        if next != self.view {
            self.history.push(self.view);
            self.view = next;
        }
        self
    }

    fn back(mut self) -> Result<Session, (Session, NavigationError)> {
        match self.history.pop() {
            Some(previous) => {
                self.view = previous;
                Ok(self)
            }
            None => Err((self, NavigationError::NoHistory)),
        }
    }
}
