//! Indexed color palette shared by the server and the browser client.
//!
//! Colors travel on the wire (and in snapshots) as a single byte index
//! into [`PALETTE`]. Anything outside the palette is rejected at the
//! canvas layer.

/// A palette index as carried in pixel records.
pub type ColorIndex = u8;

/// Number of entries in the palette.
pub const PALETTE_SIZE: usize = 30;

/// Background color for a fresh canvas (white).
pub const DEFAULT_COLOR: ColorIndex = 29;

/// Hex values for each palette index.
pub const PALETTE: [&str; PALETTE_SIZE] = [
    "#ff0000", // red
    "#ffa600", // orange
    "#ffe600", // yellow
    "#8aff00", // light green
    "#24ff00", // green
    "#00ff00", // dark green
    "#00ff83", // cyan
    "#00ffe6", // light cyan
    "#00e7ff", // sky blue
    "#008fff", // blue
    "#0024ff", // dark blue
    "#2400ff", // purple
    "#8a00ff", // magenta
    "#ff00ff", // pink
    "#ff0083", // hot pink
    "#ff0024", // maroon
    "#d70000", // dark red
    "#8c4000", // brown
    "#e67c00", // orange brown
    "#b1d700", // light yellow
    "#4cc100", // dark yellow
    "#00c16a", // turquoise
    "#00c1c1", // aqua
    "#0055c1", // dark aqua
    "#002fc1", // navy
    "#7200c1", // dark purple
    "#c10072", // plum
    "#8c2600", // dark brown
    "#000000", // black
    "#ffffff", // white
];

/// Returns true if `color` names a palette entry.
pub fn is_valid_color(color: ColorIndex) -> bool {
    (color as usize) < PALETTE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_color_is_white() {
        assert_eq!(PALETTE[DEFAULT_COLOR as usize], "#ffffff");
    }

    #[test]
    fn palette_bounds() {
        assert!(is_valid_color(0));
        assert!(is_valid_color((PALETTE_SIZE - 1) as u8));
        assert!(!is_valid_color(PALETTE_SIZE as u8));
        assert!(!is_valid_color(u8::MAX));
    }
}
