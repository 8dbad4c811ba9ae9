use colored::Color;

pub const PRIMARY: Color = Color::BrightGreen;
pub const ACCENT: Color = Color::BrightYellow;
pub const SEPARATOR: Color = Color::BrightBlack;
pub const TEXT_DEFAULT: Color = Color::White;

pub const HEALTHY: Color = Color::Green;
pub const FROZEN: Color = Color::Red;
pub const ADDRESS: Color = Color::Cyan;
