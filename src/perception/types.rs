use serde::{Deserialize, Serialize};

/// Absolute screen point in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, by: Position) -> Self {
        Self::new(self.x + by.x, self.y + by.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Axis-aligned screen rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Square of side `2 * expand` centred on `hint`, clamped so it never
    /// starts left of or above the screen origin.
    pub fn around(hint: Position, expand: u32) -> Self {
        let expand_i = expand as i32;
        Self {
            x: (hint.x - expand_i).max(0),
            y: (hint.y - expand_i).max(0),
            width: expand * 2,
            height: expand * 2,
        }
    }

    pub fn origin(&self) -> Position {
        Position::new(self.x, self.y)
    }

    /// Integer centre, rounding toward the origin.
    pub fn center(&self) -> Position {
        Position::new(
            self.x + (self.width / 2) as i32,
            self.y + (self.height / 2) as i32,
        )
    }
}

/// One line or word returned by a text recogniser, in image-local pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub text: String,
    pub bbox: Region,
    pub confidence: f32,
}

impl TextRegion {
    pub fn center(&self) -> Position {
        self.bbox.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn around_clamps_at_origin() {
        let r = Region::around(Position::new(50, 400), 200);
        assert_eq!(r, Region::new(0, 200, 400, 400));
    }

    #[test]
    fn center_rounds_down() {
        assert_eq!(Region::new(10, 10, 21, 11).center(), Position::new(20, 15));
    }
}
