//! Saved program cards for the "Program" panel.

use minijinja::{context, AutoEscape, Environment};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

const CARDS_TEMPLATE: &str = r#"<div class='card-grid'>
{%- for card in cards %}
  <div class='school-card' id='card-{{ loop.index0 }}' data-id='{{ card.id }}'>
    <div class='school-card-header'>
      <strong>🏫 {{ card.school }}</strong>
      <button class='delete-btn' data-index='{{ loop.index0 }}' data-id='{{ card.id }}' title='Remove'>❌</button>
    </div>
    <span>📘 {{ card.program }}</span>
  </div>
{%- endfor %}
</div>"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramCard {
    /// Assigned on creation; unlike the position it survives other deletions.
    pub id: Uuid,
    pub school: String,
    pub program: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProgramBoard {
    cards: Vec<ProgramCard>,
}

impl ProgramBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[ProgramCard] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn add(&mut self, school: impl Into<String>, program: impl Into<String>) -> &ProgramCard {
        let card = ProgramCard {
            id: Uuid::new_v4(),
            school: school.into(),
            program: program.into(),
        };
        debug!(id = %card.id, school = %card.school, program = %card.program, "Program card added");
        self.cards.push(card);
        &self.cards[self.cards.len() - 1]
    }

    /// Removes the card currently at `index`. Anything out of range, negative
    /// included, is ignored.
    pub fn delete_at(&mut self, index: i64) -> Option<ProgramCard> {
        let index = usize::try_from(index).ok().filter(|i| *i < self.cards.len())?;
        Some(self.cards.remove(index))
    }

    /// Removes the card with `id`, if it is still on the board.
    pub fn remove(&mut self, id: Uuid) -> Option<ProgramCard> {
        let index = self.cards.iter().position(|card| card.id == id)?;
        Some(self.cards.remove(index))
    }

    pub fn render(&self) -> Result<String, minijinja::Error> {
        render_cards(&self.cards)
    }
}

/// Grid markup with one card per entry, in board order. Text is HTML-escaped.
pub fn render_cards(cards: &[ProgramCard]) -> Result<String, minijinja::Error> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);
    env.render_str(CARDS_TEMPLATE, context! { cards => cards })
}
