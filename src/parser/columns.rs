use serde::Deserialize;

/// Position of each subject field among a subject row's `<td>` cells,
/// plus the markers the results page uses. Layout drift on the portal
/// is a settings change, not a code change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub external: usize,
    pub internal: usize,
    pub total: usize,
    pub grade: usize,
    pub status: usize,
    /// Minimum data cells for a row to count as a subject row.
    pub min_cells: usize,
    /// Header text of the column-title row, which is skipped.
    pub header_label: String,
    /// `alt` text of the student photo `<img>`.
    pub photo_alt: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            external: 0,
            internal: 1,
            total: 2,
            grade: 5,
            status: 6,
            min_cells: 7,
            header_label: "Paper".to_string(),
            photo_alt: "NO FILE".to_string(),
        }
    }
}

impl ColumnMap {
    pub fn validate(&self) -> anyhow::Result<()> {
        let highest = [self.external, self.internal, self.total, self.grade, self.status]
            .into_iter()
            .max()
            .unwrap_or_default();
        // a one-cell row is an attribute row, never a subject row
        if self.min_cells < 2 {
            anyhow::bail!("min_cells must be at least 2 (got {})", self.min_cells);
        }
        if highest >= self.min_cells {
            anyhow::bail!(
                "column index {} out of range for min_cells = {}",
                highest,
                self.min_cells
            );
        }
        Ok(())
    }
}
