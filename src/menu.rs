//! ## Menu
//!
//! The operator menu as a state machine. [`transition`] is pure: it maps the
//! current state and a validated choice to the next state and the effect the
//! application has to carry out. Rendering and I/O live in [`crate::app`].
//!

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    /// Pick a catalogued resource to open
    ResourceSelect,
    MainMenu,
    Memory,
}

/// What the application does after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    Exit,
    /// Close the open session before the catalog is shown again
    CloseSession,
    /// Open the catalog entry at this index. When the open fails the
    /// application stays in [`MenuState::ResourceSelect`].
    OpenResource(usize),
    Identify,
    Query,
    Write,
    Read,
    SetTimeout,
    SetReadBytes,
    CatalogMemory,
    SaveTrace,
}

pub const MAIN_MENU: &str = "\
\n-------- MAIN MENU --------
 Please select an option:
0: Exit program.
1: Connect to a different resource.
2: Identify resource.
3: Query command.
4: Write command.
5: Read command.
6: Set timeout.
7: Set read bytes.
8: Memory options.";

pub const MEMORY_MENU: &str = "\
\n--------- MEMORY COMMANDS --------
 Please select an option:
0: Previous page.
1: View local memory at C:\\
2: Save trace to computer using markers.";

/// Number of choices offered in `state`. Resource selection offers one per
/// catalog entry.
pub fn option_count(state: MenuState, catalog_len: usize) -> usize {
    match state {
        MenuState::ResourceSelect => catalog_len,
        MenuState::MainMenu => 9,
        MenuState::Memory => 3,
    }
}

/// ### Transition
///
/// A choice outside `0..option_count` is a [`Error::Validation`] and leaves
/// the state as it was.
///
/// ```
/// use scpi_ctl::menu::{transition, Effect, MenuState};
///
/// let (next, effect) = transition(MenuState::MainMenu, 1, 4).unwrap();
/// assert_eq!(next, MenuState::ResourceSelect);
/// assert_eq!(effect, Effect::CloseSession);
/// ```
///
pub fn transition(state: MenuState, choice: i64, catalog_len: usize) -> Result<(MenuState, Effect)> {
    Error::check_range(choice, 0, option_count(state, catalog_len) as i64 - 1)?;

    let next = match (state, choice) {
        (MenuState::ResourceSelect, index) => (MenuState::MainMenu, Effect::OpenResource(index as usize)),

        (MenuState::MainMenu, 0) => (MenuState::MainMenu, Effect::Exit),
        (MenuState::MainMenu, 1) => (MenuState::ResourceSelect, Effect::CloseSession),
        (MenuState::MainMenu, 2) => (MenuState::MainMenu, Effect::Identify),
        (MenuState::MainMenu, 3) => (MenuState::MainMenu, Effect::Query),
        (MenuState::MainMenu, 4) => (MenuState::MainMenu, Effect::Write),
        (MenuState::MainMenu, 5) => (MenuState::MainMenu, Effect::Read),
        (MenuState::MainMenu, 6) => (MenuState::MainMenu, Effect::SetTimeout),
        (MenuState::MainMenu, 7) => (MenuState::MainMenu, Effect::SetReadBytes),
        (MenuState::MainMenu, _) => (MenuState::Memory, Effect::None),

        (MenuState::Memory, 0) => (MenuState::MainMenu, Effect::None),
        (MenuState::Memory, 1) => (MenuState::Memory, Effect::CatalogMemory),
        (MenuState::Memory, _) => (MenuState::Memory, Effect::SaveTrace),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_menu_choices() {
        let effects: Vec<_> = (0..9)
            .map(|choice| transition(MenuState::MainMenu, choice, 3).unwrap())
            .collect();

        assert_eq!(effects[0], (MenuState::MainMenu, Effect::Exit));
        assert_eq!(effects[1], (MenuState::ResourceSelect, Effect::CloseSession));
        assert_eq!(effects[5], (MenuState::MainMenu, Effect::Read));
        assert_eq!(effects[8], (MenuState::Memory, Effect::None));
    }

    #[test]
    fn memory_menu_choices() {
        assert_eq!(
            transition(MenuState::Memory, 0, 3).unwrap(),
            (MenuState::MainMenu, Effect::None)
        );
        assert_eq!(
            transition(MenuState::Memory, 2, 3).unwrap(),
            (MenuState::Memory, Effect::SaveTrace)
        );
    }

    #[test]
    fn resource_choice_is_bounded_by_catalog() {
        assert_eq!(
            transition(MenuState::ResourceSelect, 2, 3).unwrap(),
            (MenuState::MainMenu, Effect::OpenResource(2))
        );
        assert!(matches!(
            transition(MenuState::ResourceSelect, 3, 3),
            Err(Error::Validation { value: 3, min: 0, max: 2 })
        ));
        assert!(transition(MenuState::ResourceSelect, 0, 0).is_err());
    }

    #[test]
    fn out_of_range_choices_are_rejected() {
        assert!(transition(MenuState::MainMenu, 9, 3).is_err());
        assert!(transition(MenuState::MainMenu, -1, 3).is_err());
        assert!(transition(MenuState::Memory, 3, 3).is_err());
    }
}
