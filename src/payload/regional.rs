//! Regional layout definitions and prompt assembly
//!
//! A regional layout partitions the generated image into prompt-addressable
//! regions. The downstream script reads the split from separator tokens
//! embedded in the prompt (`ADDCOMM`, `ADDCOL`, `ADDROW`) together with a
//! per-layout argument block attached to the payload's extension section.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Script name the downstream extension is registered under
pub const SCRIPT_KEY: &str = "Regional Prompter";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionalLayout {
    /// Left/right split, 2 regions
    Vertical,
    /// Top/bottom split, 2 regions
    Horizontal,
    /// Left/center/right columns, 3 regions
    ThreeColumns,
    /// Four vertical columns, 4 regions
    FourColumns,
    /// 2x2 grid, 4 regions
    Quadrants,
}

impl RegionalLayout {
    /// The 17-element argument block the downstream extension expects:
    /// [Active, Debug, Mode, DivideMode, MaskMode, PromptMode, Ratios,
    ///  BaseRatios, UseBase, UseCommon, UseCommonNeg, GenMode,
    ///  DisableConvertAND, LoraTextEnc, LoraUNet, Threshold, MaskPath]
    pub fn script_args(self) -> Value {
        let (divide_mode, ratios) = match self {
            RegionalLayout::Vertical => ("Vertical", "1,1"),
            RegionalLayout::Horizontal => ("Horizontal", "1,1"),
            RegionalLayout::ThreeColumns => ("Vertical", "1,1,1"),
            RegionalLayout::FourColumns => ("Vertical", "1,1,1,1"),
            RegionalLayout::Quadrants => ("Vertical", "2,2"),
        };
        json!({
            "args": [
                true, false, "Matrix", divide_mode, "Mask", "Prompt", ratios,
                "", false, true, false, "Attention", false, "0", "0", "0", ""
            ]
        })
    }
}

/// Caller-supplied regional prompt specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalSpec {
    pub layout: RegionalLayout,
    pub common_prompt: String,
    pub region1_prompt: String,
    pub region2_prompt: String,
    #[serde(default)]
    pub region3_prompt: Option<String>,
    #[serde(default)]
    pub region4_prompt: Option<String>,
}

impl RegionalSpec {
    /// Assemble the ordered prompt parts, separators included.
    ///
    /// Unset trailing regions fall back to earlier regions rather than empty
    /// strings: region 3 defaults to region 1, region 4 to region 2.
    pub fn prompt_parts(&self) -> Vec<&str> {
        let common = self.common_prompt.as_str();
        let r1 = self.region1_prompt.as_str();
        let r2 = self.region2_prompt.as_str();
        let r3 = self.region3_prompt.as_deref().unwrap_or(r1);
        let r4 = self.region4_prompt.as_deref().unwrap_or(r2);

        match self.layout {
            RegionalLayout::Vertical => vec![common, "ADDCOMM", r1, "ADDCOL", r2],
            RegionalLayout::Horizontal => vec![common, "ADDCOMM", r1, "ADDROW", r2],
            RegionalLayout::ThreeColumns => {
                vec![common, "ADDCOMM", r1, "ADDCOL", r2, "ADDCOL", r3]
            }
            RegionalLayout::FourColumns => {
                vec![common, "ADDCOMM", r1, "ADDCOL", r2, "ADDCOL", r3, "ADDCOL", r4]
            }
            RegionalLayout::Quadrants => {
                vec![common, "ADDCOMM", r1, "ADDCOL", r2, "ADDROW", r3, "ADDCOL", r4]
            }
        }
    }

    /// The assembled prompt, ready for style-modifier folding
    pub fn assemble_prompt(&self) -> String {
        self.prompt_parts().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(layout: RegionalLayout) -> RegionalSpec {
        RegionalSpec {
            layout,
            common_prompt: "sky".to_string(),
            region1_prompt: "cat".to_string(),
            region2_prompt: "dog".to_string(),
            region3_prompt: None,
            region4_prompt: None,
        }
    }

    #[test]
    fn three_columns_region3_defaults_to_region1() {
        let prompt = spec(RegionalLayout::ThreeColumns).assemble_prompt();
        assert_eq!(prompt, "sky ADDCOMM cat ADDCOL dog ADDCOL cat");
    }

    #[test]
    fn four_columns_trailing_regions_fall_back() {
        let prompt = spec(RegionalLayout::FourColumns).assemble_prompt();
        assert_eq!(prompt, "sky ADDCOMM cat ADDCOL dog ADDCOL cat ADDCOL dog");
    }

    #[test]
    fn quadrants_alternate_column_and_row_separators() {
        let prompt = spec(RegionalLayout::Quadrants).assemble_prompt();
        assert_eq!(prompt, "sky ADDCOMM cat ADDCOL dog ADDROW cat ADDCOL dog");
    }

    #[test]
    fn supplied_regions_are_used_verbatim() {
        let mut s = spec(RegionalLayout::Quadrants);
        s.region3_prompt = Some("bird".to_string());
        s.region4_prompt = Some("fish".to_string());
        assert_eq!(
            s.assemble_prompt(),
            "sky ADDCOMM cat ADDCOL dog ADDROW bird ADDCOL fish"
        );
    }

    #[test]
    fn quadrants_args_use_two_by_two_ratio() {
        let args = RegionalLayout::Quadrants.script_args();
        assert_eq!(args["args"][6], "2,2");
        assert_eq!(args["args"][3], "Vertical");

        let args = RegionalLayout::Horizontal.script_args();
        assert_eq!(args["args"][3], "Horizontal");
        assert_eq!(args["args"][6], "1,1");
    }
}
