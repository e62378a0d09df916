//! Stable label colors. Tasks and servers share one registry, so a task
//! and a server may end up with the same color.
use indexmap::IndexMap;
use sched_scope_api::Color;

/// The Tableau 10 palette.
pub const TABLEAU: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Clone)]
pub struct ColorAssignment {
    palette: Vec<Color>,
    assigned: IndexMap<String, usize>,
}

impl ColorAssignment {
    pub fn new(palette: &[&str]) -> Self {
        assert!(!palette.is_empty(), "palette must not be empty");
        Self {
            palette: palette.iter().map(|c| c.to_string()).collect(),
            assigned: IndexMap::new(),
        }
    }

    /// The color of `label`, assigning the next palette slot on first
    /// sight.
    pub fn color_for(&mut self, label: &str) -> Color {
        let next = self.assigned.len() % self.palette.len();
        let slot = *self.assigned.entry(label.to_string()).or_insert(next);
        self.palette[slot].clone()
    }

    /// The color already assigned to `label`, if any.
    pub fn color_of(&self, label: &str) -> Option<Color> {
        self.assigned
            .get(label)
            .map(|&slot| self.palette[slot].clone())
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

impl Default for ColorAssignment {
    fn default() -> Self {
        Self::new(&TABLEAU)
    }
}
