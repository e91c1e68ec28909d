// Physical input simulation. The trait is what the player drives; `EnigoDriver`
// is the desktop implementation.
use std::time::Duration;

use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use serde::{Deserialize, Serialize};

use crate::config::PlayerConfig;
use crate::errors::{ReplayError, ReplayResult};
use crate::executor::keys::to_enigo_key;
use crate::perception::types::Position;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

/// Primitive motor actions. Implementations own the click/type pacing:
/// `click_delay` elapses after moving and before pressing, `type_delay`
/// between typed characters.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn click(&self, at: Position, button: MouseButton) -> ReplayResult<()>;

    async fn scroll(
        &self,
        at: Position,
        amount: i32,
        direction: ScrollDirection,
    ) -> ReplayResult<()>;

    /// Press at `from`, move smoothly to `to`, release. Never a teleport.
    async fn drag(&self, from: Position, to: Position) -> ReplayResult<()>;

    /// Type `text`, clicking `focus` first when given.
    async fn type_text(&self, text: &str, focus: Option<Position>) -> ReplayResult<()>;

    async fn press_key(&self, key: &str) -> ReplayResult<()>;

    /// Hold `keys` in order, then release them in reverse order.
    async fn hotkey(&self, keys: &[String]) -> ReplayResult<()>;

    async fn move_to(&self, at: Position) -> ReplayResult<()>;
}

/// Interpolated waypoints for a drag, excluding the start and including the end.
pub fn drag_path(from: Position, to: Position, steps: u32) -> Vec<Position> {
    let steps = steps.max(1);
    let dx = (to.x - from.x) as f64 / steps as f64;
    let dy = (to.y - from.y) as f64 / steps as f64;
    (1..=steps)
        .map(|i| {
            Position::new(
                (from.x as f64 + dx * i as f64).round() as i32,
                (from.y as f64 + dy * i as f64).round() as i32,
            )
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct EnigoDriver {
    click_delay: Duration,
    type_delay: Duration,
    drag_duration: Duration,
}

impl EnigoDriver {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            click_delay: Duration::from_millis(config.click_delay),
            type_delay: Duration::from_millis(config.type_delay),
            drag_duration: Duration::from_millis(500),
        }
    }

    pub fn with_drag_duration(mut self, duration: Duration) -> Self {
        self.drag_duration = duration;
        self
    }

    /// Runs `f` with a fresh enigo connection on the blocking pool.
    async fn with_enigo<F>(&self, what: &'static str, f: F) -> ReplayResult<()>
    where
        F: FnOnce(&mut Enigo) -> ReplayResult<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut enigo = Enigo::new(&Settings::default())
                .map_err(|e| ReplayError::Input(format!("{what}: connect: {e}")))?;
            f(&mut enigo)
        })
        .await
        .map_err(|e| ReplayError::Input(format!("{what}: join: {e}")))?
    }
}

fn input_err(what: &str, e: impl std::fmt::Display) -> ReplayError {
    ReplayError::Input(format!("{what}: {e}"))
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn lookup_key(name: &str) -> ReplayResult<enigo::Key> {
    to_enigo_key(name).ok_or_else(|| ReplayError::Input(format!("unknown key: {name}")))
}

fn move_and_click(
    enigo: &mut Enigo,
    at: Position,
    button: Button,
    delay: Duration,
) -> ReplayResult<()> {
    enigo
        .move_mouse(at.x, at.y, Coordinate::Abs)
        .map_err(|e| input_err("move", e))?;
    std::thread::sleep(delay);
    enigo
        .button(button, Direction::Click)
        .map_err(|e| input_err("click", e))
}

#[async_trait]
impl InputDriver for EnigoDriver {
    async fn click(&self, at: Position, button: MouseButton) -> ReplayResult<()> {
        let delay = self.click_delay;
        tracing::debug!(x = at.x, y = at.y, ?button, "click");
        self.with_enigo("click", move |enigo| {
            move_and_click(enigo, at, to_enigo_button(button), delay)
        })
        .await
    }

    async fn scroll(
        &self,
        at: Position,
        amount: i32,
        direction: ScrollDirection,
    ) -> ReplayResult<()> {
        let delay = self.click_delay;
        tracing::debug!(x = at.x, y = at.y, amount, ?direction, "scroll");
        self.with_enigo("scroll", move |enigo| {
            enigo
                .move_mouse(at.x, at.y, Coordinate::Abs)
                .map_err(|e| input_err("move", e))?;
            std::thread::sleep(delay);
            // enigo: positive length scrolls down / right.
            let (length, axis) = match direction {
                ScrollDirection::Up => (-amount, Axis::Vertical),
                ScrollDirection::Down => (amount, Axis::Vertical),
                ScrollDirection::Left => (-amount, Axis::Horizontal),
                ScrollDirection::Right => (amount, Axis::Horizontal),
            };
            enigo.scroll(length, axis).map_err(|e| input_err("scroll", e))
        })
        .await
    }

    async fn drag(&self, from: Position, to: Position) -> ReplayResult<()> {
        let delay = self.click_delay;
        let duration = self.drag_duration;
        let steps = ((duration.as_secs_f64() * 60.0) as u32).max(10);
        tracing::debug!(from = %from, to = %to, steps, "drag");
        self.with_enigo("drag", move |enigo| {
            enigo
                .move_mouse(from.x, from.y, Coordinate::Abs)
                .map_err(|e| input_err("move", e))?;
            std::thread::sleep(delay);
            enigo
                .button(Button::Left, Direction::Press)
                .map_err(|e| input_err("press", e))?;
            let pause = duration / steps;
            let mut moved = Ok(());
            for p in drag_path(from, to, steps) {
                if let Err(e) = enigo.move_mouse(p.x, p.y, Coordinate::Abs) {
                    moved = Err(input_err("move", e));
                    break;
                }
                std::thread::sleep(pause);
            }
            // Always release, even if a move failed midway.
            let released = enigo
                .button(Button::Left, Direction::Release)
                .map_err(|e| input_err("release", e));
            moved.and(released)
        })
        .await
    }

    async fn type_text(&self, text: &str, focus: Option<Position>) -> ReplayResult<()> {
        let delay = self.click_delay;
        let per_char = self.type_delay;
        let text = text.to_string();
        tracing::debug!(chars = text.chars().count(), focus = ?focus, "type text");
        self.with_enigo("type", move |enigo| {
            if let Some(at) = focus {
                move_and_click(enigo, at, Button::Left, delay)?;
                std::thread::sleep(delay);
            }
            let mut buf = [0u8; 4];
            for c in text.chars() {
                enigo
                    .text(c.encode_utf8(&mut buf))
                    .map_err(|e| input_err("type", e))?;
                std::thread::sleep(per_char);
            }
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> ReplayResult<()> {
        let k = lookup_key(key)?;
        tracing::debug!(key, "press key");
        self.with_enigo("key", move |enigo| {
            enigo.key(k, Direction::Click).map_err(|e| input_err("key", e))
        })
        .await
    }

    async fn hotkey(&self, keys: &[String]) -> ReplayResult<()> {
        let resolved = keys
            .iter()
            .map(|k| lookup_key(k))
            .collect::<ReplayResult<Vec<_>>>()?;
        tracing::debug!(?keys, "hotkey");
        self.with_enigo("hotkey", move |enigo| {
            let mut pressed = Vec::with_capacity(resolved.len());
            let mut outcome = Ok(());
            for k in &resolved {
                if let Err(e) = enigo.key(*k, Direction::Press) {
                    outcome = Err(input_err("hotkey press", e));
                    break;
                }
                pressed.push(*k);
            }
            for k in pressed.iter().rev() {
                if let Err(e) = enigo.key(*k, Direction::Release) {
                    if outcome.is_ok() {
                        outcome = Err(input_err("hotkey release", e));
                    }
                }
            }
            outcome
        })
        .await
    }

    async fn move_to(&self, at: Position) -> ReplayResult<()> {
        self.with_enigo("move", move |enigo| {
            enigo
                .move_mouse(at.x, at.y, Coordinate::Abs)
                .map_err(|e| input_err("move", e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_path_ends_at_target() {
        let path = drag_path(Position::new(0, 0), Position::new(100, 50), 10);
        assert_eq!(path.len(), 10);
        assert_eq!(path[0], Position::new(10, 5));
        assert_eq!(*path.last().unwrap(), Position::new(100, 50));
    }

    #[test]
    fn scroll_direction_defaults_down() {
        let d: ScrollDirection = serde_json::from_str("\"up\"").unwrap();
        assert_eq!(d, ScrollDirection::Up);
        assert_eq!(ScrollDirection::default(), ScrollDirection::Down);
    }
}
