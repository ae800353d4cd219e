//! Markdown resource-requirement report, one column per model.

use std::fmt::Write;

use crate::estimate::{MemoryBreakdown, RegionGroup};
use crate::MIB;

/// Builds a side-by-side markdown report for several models.
pub struct MarkdownReport {
    title: String,
    budget_bytes: u64,
    models: Vec<(String, MemoryBreakdown)>,
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB as f64
}

impl MarkdownReport {
    pub fn new(title: impl Into<String>, budget_bytes: u64) -> Self {
        Self {
            title: title.into(),
            budget_bytes,
            models: Vec::new(),
        }
    }

    pub fn add_model(&mut self, name: impl Into<String>, breakdown: MemoryBreakdown) -> &mut Self {
        self.models.push((name.into(), breakdown));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Render the full report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", self.title);

        for group in [RegionGroup::Tokenizer, RegionGroup::TransformerWeights, RegionGroup::RunState] {
            self.write_group(&mut out, group);
        }
        self.write_totals(&mut out);
        self.write_capacity(&mut out);
        out
    }

    fn write_header(&self, out: &mut String, first: &str) {
        let mut cols = vec![first.to_string()];
        cols.extend(self.models.iter().map(|(name, _)| format!("{name}<br>(MB)")));
        let _ = writeln!(out, "{}", cols.join(" | "));
        let _ = writeln!(out, "{}", vec!["---"; cols.len()].join(" | "));
    }

    fn write_row(out: &mut String, label: &str, values: impl Iterator<Item = String>) {
        let mut cols = vec![label.to_string()];
        cols.extend(values);
        let _ = writeln!(out, "{}", cols.join(" | "));
    }

    fn write_group(&self, out: &mut String, group: RegionGroup) {
        let Some((_, first)) = self.models.first() else { return };
        let _ = writeln!(out, "### {}\n", group.label());
        self.write_header(out, "Memory Type");

        let pick = |b: &MemoryBreakdown| match group {
            RegionGroup::Tokenizer => b.tokenizer.clone(),
            RegionGroup::TransformerWeights => b.weights.clone(),
            RegionGroup::RunState => b.run_state.clone(),
        };

        // All models share the same region names; take them from the first.
        for region in &pick(first).regions {
            let values = self.models.iter().map(|(_, b)| {
                format!("{:.2}", mib(pick(b).get(region.name).unwrap_or(0)))
            });
            Self::write_row(out, region.name, values);
        }
        let totals = self.models.iter().map(|(_, b)| format!("{:.2}", mib(pick(b).total())));
        Self::write_row(out, "Total", totals);
        out.push_str("\n\n");
    }

    fn write_totals(&self, out: &mut String) {
        if self.models.is_empty() {
            return;
        }
        let _ = writeln!(out, "### Total Memory\n");
        self.write_header(out, "Memory Type");

        let rows: [(&str, fn(&MemoryBreakdown) -> u64); 5] = [
            ("Total Tokenizer Memory (per model)", |b| b.tokenizer.total()),
            ("Total TransformerWeights Memory (per model)", |b| b.weights.total()),
            ("Total RunState Memory (per caller)", |b| b.run_state_bytes()),
            ("KV Cache Memory (per caller)", |b| b.kv_cache_bytes()),
            ("Overall Total Memory (1 caller)", |b| b.total_bytes(1)),
        ];
        for (label, f) in rows {
            let values = self.models.iter().map(|(_, b)| format!("{:.2}", mib(f(b))));
            Self::write_row(out, label, values);
        }
        out.push_str("\n\n");
    }

    fn write_capacity(&self, out: &mut String) {
        if self.models.is_empty() {
            return;
        }
        let _ = writeln!(out, "### Host Capacity ({:.0} MB budget)\n", mib(self.budget_bytes));
        self.write_header(out, "Host Metrics");
        let values = self
            .models
            .iter()
            .map(|(_, b)| b.max_callers(self.budget_bytes).to_string());
        Self::write_row(out, "Max number of concurrent callers", values);
        out.push_str("\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{ModelConfig, VocabSize};

    fn tiny() -> MemoryBreakdown {
        MemoryBreakdown::estimate(&ModelConfig {
            dim: 64,
            hidden_dim: 128,
            n_layers: 2,
            n_heads: 4,
            n_kv_heads: 4,
            vocab: VocabSize { magnitude: 512, flag: true },
            seq_len: 64,
        })
    }

    #[test]
    fn test_render_contains_all_sections() {
        let mut report = MarkdownReport::new("Host resource requirements", 4 * MIB);
        report.add_model("tiny", tiny());
        let md = report.render();

        assert!(md.starts_with("# Host resource requirements"));
        assert!(md.contains("### Tokenizer Memory (per model)"));
        assert!(md.contains("### TransformerWeights Memory (per model)"));
        assert!(md.contains("### RunState Memory (per caller)"));
        assert!(md.contains("### Total Memory"));
        assert!(md.contains("Memory Type | tiny<br>(MB)"));
        assert!(md.contains("key_cache | 0.03"));
        // (4 MiB - 595712) / 71168 = 50
        assert!(md.contains("Max number of concurrent callers | 50"));
    }

    #[test]
    fn test_side_by_side_columns() {
        let mut report = MarkdownReport::new("r", 4 * MIB);
        report.add_model("a", tiny()).add_model("b", tiny());
        let md = report.render();
        assert!(md.contains("Memory Type | a<br>(MB) | b<br>(MB)"));
        assert!(md.contains("--- | --- | ---"));
    }

    #[test]
    fn test_empty_report_has_only_title() {
        let report = MarkdownReport::new("nothing", MIB);
        assert!(report.is_empty());
        assert_eq!(report.render(), "# nothing\n\n");
    }
}
