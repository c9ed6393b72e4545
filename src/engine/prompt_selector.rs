use std::collections::VecDeque;

use tracing::warn;

use crate::constants::{
    FALLBACK_ACTIONS, FALLBACK_CHARACTERS, MAX_DRAW_ATTEMPTS, RECENT_WINDOW_SIZE,
};
use crate::game_data::GameDataStore;
use crate::rng::Rng;
use crate::types::{GameData, Prompt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Combination {
    pub character_index: usize,
    pub action_index: usize,
}

/// Draws character/action prompts while steering away from recent picks.
///
/// A candidate is rejected when any remembered combination shares its
/// character index or its action index. After [`MAX_DRAW_ATTEMPTS`]
/// rejections the last candidate is returned anyway and is not remembered.
#[derive(Clone, Debug)]
pub struct PromptSelector {
    characters: Vec<String>,
    actions: Vec<String>,
    recent: VecDeque<Combination>,
    rng: Rng,
}

impl PromptSelector {
    pub fn new(data: GameData, rng: Rng) -> Self {
        let data = if data.is_usable() {
            data
        } else {
            fallback_game_data()
        };
        Self {
            characters: data.characters,
            actions: data.actions,
            recent: VecDeque::with_capacity(RECENT_WINDOW_SIZE + 1),
            rng,
        }
    }

    /// Resolves the catalog before handing out a selector; a failed or empty
    /// fetch degrades to the fallback pairs instead of failing.
    pub async fn load(store: &dyn GameDataStore, rng: Rng) -> Self {
        let data = match store.fetch().await {
            Ok(data) if data.is_usable() => data,
            Ok(_) => {
                warn!("game data has no characters or no actions, using fallback catalog");
                fallback_game_data()
            }
            Err(error) => {
                warn!(%error, "failed to load game data, using fallback catalog");
                fallback_game_data()
            }
        };
        Self::new(data, rng)
    }

    pub fn next_prompt(&mut self) -> Prompt {
        let mut candidate = self.draw();
        for attempt in 1..=MAX_DRAW_ATTEMPTS {
            if !self.is_recent(candidate) {
                self.remember(candidate);
                return self.prompt_for(candidate);
            }
            if attempt < MAX_DRAW_ATTEMPTS {
                candidate = self.draw();
            }
        }
        self.prompt_for(candidate)
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }

    pub fn recent_combinations(&self) -> impl Iterator<Item = &Combination> {
        self.recent.iter()
    }

    pub fn catalog_size(&self) -> (usize, usize) {
        (self.characters.len(), self.actions.len())
    }

    fn draw(&mut self) -> Combination {
        Combination {
            character_index: self.rng.pick_index(self.characters.len()),
            action_index: self.rng.pick_index(self.actions.len()),
        }
    }

    fn is_recent(&self, candidate: Combination) -> bool {
        self.recent.iter().any(|combo| {
            combo.character_index == candidate.character_index
                || combo.action_index == candidate.action_index
        })
    }

    fn remember(&mut self, combination: Combination) {
        self.recent.push_back(combination);
        while self.recent.len() > RECENT_WINDOW_SIZE {
            self.recent.pop_front();
        }
    }

    fn prompt_for(&self, combination: Combination) -> Prompt {
        Prompt {
            character: self.characters[combination.character_index].clone(),
            action: self.actions[combination.action_index].clone(),
        }
    }
}

pub fn fallback_game_data() -> GameData {
    GameData {
        characters: FALLBACK_CHARACTERS.iter().map(|v| v.to_string()).collect(),
        actions: FALLBACK_ACTIONS.iter().map(|v| v.to_string()).collect(),
    }
}
