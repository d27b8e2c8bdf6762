use anyhow::{anyhow, bail, Result};
use plotters::style::RGBColor;

/// matplotlib's `tab20` resampled to 10 entries.
const TAB20_RESAMPLED: [RGBColor; 10] = [
    RGBColor(0x1f, 0x77, 0xb4),
    RGBColor(0xff, 0x7f, 0x0e),
    RGBColor(0x2c, 0xa0, 0x2c),
    RGBColor(0xd6, 0x27, 0x28),
    RGBColor(0x94, 0x67, 0xbd),
    RGBColor(0xc4, 0x9c, 0x94),
    RGBColor(0xf7, 0xb6, 0xd2),
    RGBColor(0xc7, 0xc7, 0xc7),
    RGBColor(0xdb, 0xdb, 0x8d),
    RGBColor(0x9e, 0xda, 0xe5),
];

/// Fixed class palette, cycled by class index.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<RGBColor>,
}

impl Palette {
    pub fn new(colors: Vec<RGBColor>) -> Result<Self> {
        if colors.is_empty() {
            bail!("Palette needs at least one colour");
        }
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn color(&self, class_index: usize) -> RGBColor {
        self.colors[class_index % self.colors.len()]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: TAB20_RESAMPLED.to_vec(),
        }
    }
}

/// Parse `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Result<RGBColor> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(anyhow!("Invalid colour '{}', expected #rrggbb", hex));
    }

    let channel = |i: usize| {
        u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| anyhow!("Invalid colour '{}', expected #rrggbb", hex))
    };

    Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles() {
        let palette = Palette::default();
        assert_eq!(palette.len(), 10);
        assert_eq!(palette.color(0), RGBColor(0x1f, 0x77, 0xb4));
        assert_eq!(palette.color(10), palette.color(0));
        assert_eq!(palette.color(13), palette.color(3));
    }

    #[test]
    fn test_palette_new_rejects_empty() {
        assert!(Palette::new(Vec::new()).is_err());

        let palette = Palette::new(vec![RGBColor(1, 2, 3), RGBColor(4, 5, 6)]).unwrap();
        assert_eq!(palette.color(3), RGBColor(4, 5, 6));
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#000000").unwrap(), RGBColor(0, 0, 0));
        assert_eq!(parse_hex_color("ff7f0e").unwrap(), RGBColor(255, 127, 14));
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }
}
