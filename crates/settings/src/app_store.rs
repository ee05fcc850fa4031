use std::sync::mpsc::{self, Receiver, Sender};

use cipherstudio_storage::Storage;

use crate::theme::{ThemeError, ThemeKind, ThemeStore};

/// Typed notifications published by [`AppStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ThemeChanged(ThemeKind),
}

/// Application-scoped state shared by the host and the preview pipeline.
/// 由宿主與預覽管線共用的應用程式層級狀態。
///
/// Components receive the store explicitly and subscribe for changes; a
/// subscriber that dropped its receiver is pruned on the next publish.
#[derive(Debug)]
pub struct AppStore<S> {
    themes: ThemeStore<S>,
    theme: ThemeKind,
    subscribers: Vec<Sender<AppEvent>>,
}

impl<S: Storage> AppStore<S> {
    /// Resolves the initial theme from the stored record or the OS preference.
    pub fn new(storage: S, system_prefers_dark: bool) -> Self {
        let themes = ThemeStore::new(storage);
        let theme = themes.current(system_prefers_dark);
        Self {
            themes,
            theme,
            subscribers: Vec::new(),
        }
    }

    pub fn theme(&self) -> ThemeKind {
        self.theme
    }

    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Persists and broadcasts a theme; setting the current theme again is
    /// still persisted but not broadcast.
    /// 保存並廣播主題；與目前相同時只保存不廣播。
    pub fn set_theme(&mut self, theme: ThemeKind) -> Result<(), ThemeError> {
        self.themes.set(theme)?;
        if self.theme != theme {
            self.theme = theme;
            self.publish(AppEvent::ThemeChanged(theme));
        }
        Ok(())
    }

    pub fn toggle_theme(&mut self) -> Result<ThemeKind, ThemeError> {
        let next = self.theme.toggled();
        self.set_theme(next)?;
        Ok(next)
    }

    pub fn into_storage(self) -> S {
        self.themes.into_storage()
    }

    fn publish(&mut self, event: AppEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::debug!(event = ?event, subscribers = self.subscribers.len(), "app event published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::THEME_KEY;
    use cipherstudio_storage::MemoryStorage;

    #[test]
    fn toggle_persists_and_notifies_every_subscriber() {
        let mut store = AppStore::new(MemoryStorage::new(), true);
        assert_eq!(store.theme(), ThemeKind::Dark);
        let first = store.subscribe();
        let second = store.subscribe();

        assert_eq!(store.toggle_theme().unwrap(), ThemeKind::Light);
        assert_eq!(first.try_recv(), Ok(AppEvent::ThemeChanged(ThemeKind::Light)));
        assert_eq!(second.try_recv(), Ok(AppEvent::ThemeChanged(ThemeKind::Light)));

        let storage = store.into_storage();
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn unchanged_theme_is_not_broadcast() {
        let mut store = AppStore::new(MemoryStorage::new(), false);
        let rx = store.subscribe();
        store.set_theme(ThemeKind::Light).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut store = AppStore::new(MemoryStorage::new(), false);
        drop(store.subscribe());
        let kept = store.subscribe();
        store.toggle_theme().unwrap();
        assert_eq!(store.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
