// Messages exchanged with the browser over the session WebSocket.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::advisor::QuickAction;
use crate::chat::Transcript;
use crate::panel::{Panel, PanelView};
use crate::profile::Profile;
use crate::programs::ProgramCard;

/// Which top-level screen the page should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Intro,
    Loading,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Start { profile: Profile },
    Send { text: String },
    QuickAction { action: QuickAction },
    SelectPanel { panel: Panel },
    AddProgram {
        #[serde(default)]
        school: String,
        #[serde(default)]
        program: String,
    },
    /// Positional delete, kept for clients that only know the rendered index.
    DeleteProgram { index: i64 },
    RemoveProgram { id: Uuid },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Phase { phase: Phase },
    Transcript { turns: Transcript, streaming: bool },
    Panel { view: PanelView },
    Programs { cards: Vec<ProgramCard>, html: String },
    Error { message: String },
}
