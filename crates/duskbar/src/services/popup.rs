//! Popup visibility and the shared backdrop.
//!
//! Popups are registered once at startup from `[popups] names` and never
//! removed. At most one popup is visible at a time, and the backdrop is
//! visible exactly when one is. Renderers subscribe to [`PopupEvent`]s and
//! show or hide the matching surface.

use std::cell::RefCell;
use std::rc::Rc;

use duskbar_core::config::PopupsConfig;
use tracing::{debug, warn};

use super::callbacks::{CallbackId, Callbacks};

/// Key name the renderer reports for the escape key.
pub const KEY_ESCAPE: &str = "Escape";

/// A visibility transition of one surface (a popup or the backdrop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupEvent {
    pub name: String,
    pub visible: bool,
}

struct Registry {
    /// Registration order is kept so events come out in a stable order.
    popups: Vec<(String, bool)>,
    backdrop_visible: bool,
}

impl Registry {
    fn visible(&self) -> Option<&str> {
        self.popups
            .iter()
            .find(|(_, visible)| *visible)
            .map(|(name, _)| name.as_str())
    }
}

pub struct PopupController {
    backdrop: String,
    registry: RefCell<Registry>,
    callbacks: Callbacks<PopupEvent>,
}

impl PopupController {
    pub fn new(config: &PopupsConfig) -> Rc<Self> {
        let mut popups: Vec<(String, bool)> = Vec::with_capacity(config.names.len());
        for name in &config.names {
            if !popups.iter().any(|(existing, _)| existing == name) {
                popups.push((name.clone(), false));
            }
        }
        debug!("PopupController: registered {} popups", popups.len());

        Rc::new(Self {
            backdrop: config.backdrop.clone(),
            registry: RefCell::new(Registry {
                popups,
                backdrop_visible: false,
            }),
            callbacks: Callbacks::new(),
        })
    }

    pub fn connect<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&PopupEvent) + 'static,
    {
        self.callbacks.register(callback)
    }

    pub fn disconnect(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    pub fn backdrop_name(&self) -> &str {
        &self.backdrop
    }

    pub fn names(&self) -> Vec<String> {
        self.registry
            .borrow()
            .popups
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.borrow().popups.iter().any(|(n, _)| n == name)
    }

    pub fn is_visible(&self, name: &str) -> bool {
        let registry = self.registry.borrow();
        if name == self.backdrop {
            return registry.backdrop_visible;
        }
        registry
            .popups
            .iter()
            .any(|(n, visible)| n == name && *visible)
    }

    pub fn visible_popup(&self) -> Option<String> {
        self.registry.borrow().visible().map(String::from)
    }

    pub fn backdrop_visible(&self) -> bool {
        self.registry.borrow().backdrop_visible
    }

    /// Show `name` (closing whatever else is open), or close it if it is
    /// already showing.
    pub fn toggle(&self, name: &str) {
        if !self.is_registered(name) {
            warn!("PopupController: unknown popup '{}'", name);
            return;
        }

        let target = if self.is_visible(name) { None } else { Some(name) };
        debug!("PopupController: toggle '{}' -> {:?}", name, target.is_some());
        self.transition(target);
    }

    /// Hide every popup and the backdrop.
    pub fn close_all(&self) {
        self.transition(None);
    }

    /// Per-popup key handler. Returns whether the key was consumed.
    pub fn handle_key(&self, name: &str, key: &str) -> bool {
        if key != KEY_ESCAPE {
            return false;
        }
        debug!("PopupController: escape in '{}'", name);
        self.close_all();
        true
    }

    pub fn backdrop_clicked(&self) {
        self.close_all();
    }

    /// Move to the state where only `target` (if any) is visible and emit one
    /// event per surface that actually changed: hides first, then shows.
    fn transition(&self, target: Option<&str>) {
        let mut hidden = Vec::new();
        let mut shown = Vec::new();

        {
            let mut registry = self.registry.borrow_mut();
            for (name, visible) in registry.popups.iter_mut() {
                let want = target == Some(name.as_str());
                if *visible != want {
                    *visible = want;
                    if want {
                        shown.push(name.clone());
                    } else {
                        hidden.push(name.clone());
                    }
                }
            }

            let want_backdrop = target.is_some();
            if registry.backdrop_visible != want_backdrop {
                registry.backdrop_visible = want_backdrop;
                if want_backdrop {
                    shown.push(self.backdrop.clone());
                } else {
                    hidden.push(self.backdrop.clone());
                }
            }
        }

        for name in hidden {
            self.callbacks.notify(&PopupEvent {
                name,
                visible: false,
            });
        }
        for name in shown {
            self.callbacks.notify(&PopupEvent {
                name,
                visible: true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> (Rc<PopupController>, Rc<RefCell<Vec<PopupEvent>>>) {
        let controller = PopupController::new(&PopupsConfig::default());
        let events = Rc::new(RefCell::new(Vec::new()));
        let e = events.clone();
        controller.connect(move |event| e.borrow_mut().push(event.clone()));
        (controller, events)
    }

    fn ev(name: &str, visible: bool) -> PopupEvent {
        PopupEvent {
            name: name.to_string(),
            visible,
        }
    }

    #[test]
    fn test_toggle_shows_popup_and_backdrop() {
        let (popups, events) = controller();
        popups.toggle("wifi-popup");

        assert_eq!(popups.visible_popup().as_deref(), Some("wifi-popup"));
        assert!(popups.backdrop_visible());
        assert_eq!(
            *events.borrow(),
            vec![ev("wifi-popup", true), ev("popup-backdrop", true)]
        );
    }

    #[test]
    fn test_toggle_visible_popup_closes_it() {
        let (popups, events) = controller();
        popups.toggle("audio-popup");
        events.borrow_mut().clear();

        popups.toggle("audio-popup");
        assert_eq!(popups.visible_popup(), None);
        assert!(!popups.backdrop_visible());
        assert_eq!(
            *events.borrow(),
            vec![ev("audio-popup", false), ev("popup-backdrop", false)]
        );
    }

    #[test]
    fn test_toggle_other_popup_swaps() {
        let (popups, events) = controller();
        popups.toggle("wifi-popup");
        events.borrow_mut().clear();

        popups.toggle("bluetooth-popup");
        assert_eq!(popups.visible_popup().as_deref(), Some("bluetooth-popup"));
        assert!(!popups.is_visible("wifi-popup"));
        assert!(popups.backdrop_visible());
        assert_eq!(
            *events.borrow(),
            vec![ev("wifi-popup", false), ev("bluetooth-popup", true)]
        );
    }

    #[test]
    fn test_unknown_popup_is_ignored() {
        let (popups, events) = controller();
        popups.toggle("calendar-popup");
        assert_eq!(popups.visible_popup(), None);
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_close_all_with_nothing_visible_emits_nothing() {
        let (popups, events) = controller();
        popups.close_all();
        popups.backdrop_clicked();
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_escape_closes_and_other_keys_pass_through() {
        let (popups, _events) = controller();
        popups.toggle("brightness-popup");

        assert!(!popups.handle_key("brightness-popup", "Return"));
        assert!(popups.backdrop_visible());

        assert!(popups.handle_key("brightness-popup", KEY_ESCAPE));
        assert_eq!(popups.visible_popup(), None);
        assert!(!popups.backdrop_visible());
    }

    #[test]
    fn test_random_toggle_sequences_keep_invariant() {
        let (popups, _events) = controller();
        let mut names = popups.names();
        names.push("not-registered".to_string());

        // Small LCG keeps the sequence reproducible.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..2000 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let pick = (seed >> 33) as usize % (names.len() + 2);
            match pick {
                i if i < names.len() => popups.toggle(&names[i]),
                i if i == names.len() => popups.close_all(),
                _ => popups.backdrop_clicked(),
            }

            let visible = popups
                .names()
                .iter()
                .filter(|n| popups.is_visible(n))
                .count();
            assert!(visible <= 1);
            assert_eq!(popups.backdrop_visible(), visible == 1);
        }
    }

    #[test]
    fn test_duplicate_names_register_once() {
        let config = PopupsConfig {
            names: vec!["a".into(), "b".into(), "a".into()],
            backdrop: "bg".into(),
        };
        let popups = PopupController::new(&config);
        assert_eq!(popups.names(), vec!["a", "b"]);
        assert!(popups.is_visible("bg") == popups.backdrop_visible());
    }
}
