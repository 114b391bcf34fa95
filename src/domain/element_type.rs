// ==========================================
// Precast tracking backend - element type draft
// ==========================================
// ElementTypeDraft is the assembled, in-memory form of one input
// row; it exists only inside an import job.
// ==========================================

use serde::{Deserialize, Serialize};

/// Version code assigned to every imported element type and drawing.
pub const INITIAL_VERSION_CODE: &str = "VR-1";

/// Upper bound applied to computed density (kg/m³).
pub const DENSITY_CEILING: f64 = 10_000.0;

/// Volumes at or below this (m³) give density 0.
pub const MIN_VOLUME_M3: f64 = 1e-6;

/// Any dimensional scalar above this makes the row invalid.
pub const MAX_DIMENSION: f64 = 1e6;

/// Largest per-hierarchy quantity a row may carry; each unit becomes an
/// element row during expansion.
pub const MAX_HIERARCHY_QUANTITY: i64 = 100_000;

// ==========================================
// Dimensions - fixed numeric attributes (mm / kg / m² / m³)
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub height: f64,
    pub length: f64,
    pub thickness: f64,
    pub mass: f64,
    pub volume: f64,
    pub area: f64,
    pub width: f64,
}

impl Dimensions {
    /// Volume from the bounding dimensions, millimetres → cubic metres.
    pub fn volume_m3(&self) -> f64 {
        (self.length * self.height * self.thickness) / 1e9
    }

    /// `mass / volume_m3`, 0 for degenerate volume, clamped to the ceiling.
    pub fn density(&self) -> f64 {
        let volume = self.volume_m3();
        if volume <= MIN_VOLUME_M3 {
            return 0.0;
        }
        let density = self.mass / volume;
        if !density.is_finite() || density < 0.0 {
            return 0.0;
        }
        density.min(DENSITY_CEILING)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingDraft {
    pub drawing_type_id: i64,
    pub drawing_type_name: String,
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyQuantityDraft {
    pub hierarchy_id: i64,
    pub path: String,
    pub quantity: i64,
    pub naming_convention: String, // snapshot at assembly time
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: f64,
}

// ==========================================
// ElementTypeDraft
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementTypeDraft {
    pub project_id: i64,
    pub row_number: usize, // 1-based row in the source file, header is row 1
    pub code: String,
    pub name: String,
    pub dimensions: Dimensions,
    pub density: f64,
    pub version_code: String,
    pub stage_path: Vec<i64>,
    pub drawings: Vec<DrawingDraft>,
    pub hierarchy_quantities: Vec<HierarchyQuantityDraft>,
    pub bom_lines: Vec<BomLine>,
    pub total_count_element: i64,
    pub created_by: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(length: f64, height: f64, thickness: f64, mass: f64) -> Dimensions {
        Dimensions {
            length,
            height,
            thickness,
            mass,
            ..Default::default()
        }
    }

    #[test]
    fn test_density_happy_path() {
        let d = dims(2500.0, 300.0, 6000.0, 2400.0);
        assert!((d.volume_m3() - 4.5).abs() < 1e-9);
        // stored unrounded; 533.33 is the two-decimal display
        assert!((d.density() - 2400.0 / 4.5).abs() < 1e-9);
        assert_eq!(format!("{:.2}", d.density()), "533.33");
    }

    #[test]
    fn test_density_zero_for_tiny_volume() {
        // 10 × 10 × 10 mm = 1e-6 m³, exactly at the threshold
        assert_eq!(dims(10.0, 10.0, 10.0, 5.0).density(), 0.0);
        assert_eq!(dims(0.0, 300.0, 6000.0, 2400.0).density(), 0.0);
    }

    #[test]
    fn test_density_clamped_to_ceiling() {
        let d = dims(100.0, 100.0, 100.0, 1_000_000.0);
        assert_eq!(d.density(), DENSITY_CEILING);
    }

    #[test]
    fn test_density_always_within_bounds() {
        for mass in [0.0, 1.0, 500.0, 2400.0, 1e6] {
            for side in [1.0, 50.0, 500.0, 5000.0] {
                let density = dims(side, side, side, mass).density();
                assert!((0.0..=DENSITY_CEILING).contains(&density));
            }
        }
    }
}
