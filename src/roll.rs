use std::ops::RangeInclusive;

/// Highest serial that fits the portal's three-digit roll suffix.
pub const MAX_SERIAL: u32 = 999;

/// Fixed parts of a roll identifier: `{circular}{college}-{branch}-{serial}`.
#[derive(Debug, Clone)]
pub struct RollPrefix {
    pub circular_no: String,
    pub college_code: String,
    pub branch_code: String,
}

impl RollPrefix {
    pub fn new(circular_no: &str, college_code: &str, branch_code: &str) -> Self {
        Self {
            circular_no: circular_no.to_string(),
            college_code: college_code.to_string(),
            branch_code: branch_code.to_string(),
        }
    }

    pub fn identifier(&self, serial: u32) -> String {
        format!(
            "{}{}-{}-{:03}",
            self.circular_no, self.college_code, self.branch_code, serial
        )
    }

    /// Lazy, ascending identifiers for `roll_from..=roll_to`.
    /// An inverted range yields nothing.
    pub fn range(&self, roll_from: u32, roll_to: u32) -> RollNumbers<'_> {
        RollNumbers {
            prefix: self,
            serials: roll_from..=roll_to,
        }
    }
}

/// Iterator over synthesized roll identifiers. Call [`RollPrefix::range`]
/// again for a fresh pass.
#[derive(Debug, Clone)]
pub struct RollNumbers<'a> {
    prefix: &'a RollPrefix,
    serials: RangeInclusive<u32>,
}

impl Iterator for RollNumbers<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.serials.next().map(|s| self.prefix.identifier(s))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.serials.size_hint()
    }
}

impl ExactSizeIterator for RollNumbers<'_> {}

/// Reject ranges whose serials would not fit three digits.
pub fn check_range(roll_from: u32, roll_to: u32) -> anyhow::Result<()> {
    if roll_to > MAX_SERIAL || roll_from > MAX_SERIAL {
        anyhow::bail!(
            "roll serials must be at most {} (got {}..={})",
            MAX_SERIAL,
            roll_from,
            roll_to
        );
    }
    Ok(())
}
