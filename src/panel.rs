use serde::{Deserialize, Serialize};

/// Which side panel of the chat view is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    #[default]
    Interest,
    Program,
}

/// Visibility and tab highlighting derived from the active panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub active: Panel,
    pub interest_visible: bool,
    pub program_visible: bool,
    pub interest_tab_selected: bool,
    pub program_tab_selected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PanelController {
    active: Panel,
}

impl PanelController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Panel {
        self.active
    }

    pub fn select(&mut self, panel: Panel) -> PanelView {
        self.active = panel;
        self.view()
    }

    pub fn select_interest(&mut self) -> PanelView {
        self.select(Panel::Interest)
    }

    pub fn select_program(&mut self) -> PanelView {
        self.select(Panel::Program)
    }

    pub fn view(&self) -> PanelView {
        let interest = self.active == Panel::Interest;
        PanelView {
            active: self.active,
            interest_visible: interest,
            program_visible: !interest,
            interest_tab_selected: interest,
            program_tab_selected: !interest,
        }
    }
}
