use serde::{Deserialize, Serialize};

const PADDING: u32 = 4;
const MIN_CELL: u32 = 8;
const NARROW_WIDTH: u32 = 420;

pub const FALLBACK_LAYOUT: GridLayout = GridLayout {
    cols: 20,
    cell: MIN_CELL,
    gap: 4,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridDensity {
    #[default]
    Comfortable,
    Compact,
}

impl GridDensity {
    fn columns(self) -> std::ops::RangeInclusive<u32> {
        match self {
            GridDensity::Comfortable => 14..=26,
            GridDensity::Compact => 18..=34,
        }
    }

    fn gap(self, inner_width: u32) -> u32 {
        let narrow = inner_width < NARROW_WIDTH;
        match (self, narrow) {
            (GridDensity::Comfortable, true) => 4,
            (GridDensity::Comfortable, false) => 6,
            (GridDensity::Compact, true) => 3,
            (GridDensity::Compact, false) => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub cols: u32,
    pub cell: u32,
    pub gap: u32,
}

/// Picks the column count giving the largest integer cell for `width`.
///
/// Ties keep the smaller column count. Falls back to [`FALLBACK_LAYOUT`]
/// when no candidate reaches the minimum cell size.
pub fn compute_best_layout(width: u32, density: GridDensity) -> GridLayout {
    let inner = width.saturating_sub(PADDING * 2);
    let gap = density.gap(inner);

    let mut best: Option<GridLayout> = None;
    for cols in density.columns() {
        let Some(usable) = inner.checked_sub(gap * (cols - 1)) else {
            continue;
        };
        let cell = usable / cols;
        if cell < MIN_CELL {
            continue;
        }
        if best.is_none_or(|layout| cell > layout.cell) {
            best = Some(GridLayout { cols, cell, gap });
        }
    }

    best.unwrap_or(FALLBACK_LAYOUT)
}
