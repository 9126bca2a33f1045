//! Style roles mapping logical names to `colored::Color`
//!
//! Each role is a variant of `StyleRole`. Colouring only happens when the caller
//! passes `enabled = true`, so there is no global colour state to manage.
//!
//! ```
//! use lanequeue::core::styles::StyleRole;
//! assert_eq!(StyleRole::Header.paint("Streams", false), "Streams");
//! ```

use clap::builder::styling::AnsiColor;
use colored::{Color, Colorize};

macro_rules! style {
    ( $( $variant:ident => $color:expr ),+ $(,)? ) => {
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum StyleRole { $( $variant ),+ }

        impl StyleRole {
            pub fn color(self) -> Option<Color> {
                match self { $( StyleRole::$variant => $color ),+ }
            }
        }
    }
}

style! {
    Header      => Some(Color::Yellow),
    Literal     => Some(Color::Cyan),
    Placeholder => Some(Color::Green),
    Key         => Some(Color::BrightGreen),
    Value       => None,
    Healthy     => Some(Color::Green),
    Warning     => Some(Color::Yellow),
    Unhealthy   => Some(Color::BrightRed),
    Dim         => Some(Color::BrightBlack),
}

impl StyleRole {
    pub fn paint(self, text: &str, enabled: bool) -> String {
        match self.color() {
            Some(color) if enabled => text.color(color).to_string(),
            _ => text.to_string(),
        }
    }

    /// Foreground style spec for a prettytable cell, e.g. `Fy`
    pub fn to_prettytable_spec(self) -> Option<String> {
        let spec = match self.color()? {
            Color::Red => "r",
            Color::Green => "g",
            Color::Yellow => "y",
            Color::Blue => "b",
            Color::Cyan => "c",
            Color::BrightRed => "R",
            Color::BrightGreen => "G",
            Color::BrightBlack => "K",
            _ => return None,
        };
        Some(format!("F{spec}"))
    }
}

fn color_to_ansi(c: Color) -> Option<AnsiColor> {
    Some(match c {
        Color::Red => AnsiColor::Red,
        Color::Green => AnsiColor::Green,
        Color::Yellow => AnsiColor::Yellow,
        Color::Cyan => AnsiColor::Cyan,
        Color::BrightRed => AnsiColor::BrightRed,
        Color::BrightGreen => AnsiColor::BrightGreen,
        Color::BrightBlack => AnsiColor::BrightBlack,
        _ => return None,
    })
}

/// clap help styles built from the same roles
pub fn clap_styles(enabled: bool) -> clap::builder::Styles {
    use clap::builder::styling::{Color as ClapColor, Style};
    if !enabled {
        return clap::builder::Styles::plain();
    }

    let style = |role: StyleRole, bold: bool| {
        let mut s = Style::new();
        if let Some(col) = role.color().and_then(color_to_ansi) {
            s = s.fg_color(Some(ClapColor::Ansi(col)));
        }
        if bold {
            s = s.bold();
        }
        s
    };

    clap::builder::Styles::styled()
        .header(style(StyleRole::Header, true))
        .usage(style(StyleRole::Header, true))
        .literal(style(StyleRole::Literal, false))
        .placeholder(style(StyleRole::Placeholder, false))
        .error(style(StyleRole::Unhealthy, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_disabled_is_plain() {
        assert_eq!(StyleRole::Unhealthy.paint("down", false), "down");
        assert_eq!(StyleRole::Value.paint("42", true), "42");
    }

    #[test]
    fn prettytable_specs() {
        assert_eq!(StyleRole::Header.to_prettytable_spec(), Some("Fy".to_string()));
        assert_eq!(StyleRole::Dim.to_prettytable_spec(), Some("FK".to_string()));
        assert_eq!(StyleRole::Value.to_prettytable_spec(), None);
    }

    #[test]
    fn clap_styles_differ_when_enabled() {
        assert_ne!(
            format!("{:?}", clap_styles(false)),
            format!("{:?}", clap_styles(true))
        );
    }
}
