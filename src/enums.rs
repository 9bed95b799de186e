use serde::{Deserialize, Serialize};

/// Cutting-plane orientation of an MPR viewport.
///
/// Orientation is an explicit tag set when a viewport is created. It is never
/// inferred from a viewport's identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    /// Orientation for the `index`-th cell of a grid: AXIAL, SAGITTAL, CORONAL, repeating.
    pub fn round_robin(index: usize) -> Self {
        match index % 3 {
            0 => Orientation::Axial,
            1 => Orientation::Sagittal,
            _ => Orientation::Coronal,
        }
    }

    /// World axis (0 = x, 1 = y, 2 = z) orthogonal to this orientation's slice plane.
    pub fn normal_axis(self) -> usize {
        match self {
            Orientation::Sagittal => 0,
            Orientation::Coronal => 1,
            Orientation::Axial => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Orientation::Axial => "Axial",
            Orientation::Coronal => "Coronal",
            Orientation::Sagittal => "Sagittal",
        }
    }
}

/// How samples along the slab normal are combined into one rendered slice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlabMode {
    #[default]
    Max,
    Min,
    Average,
}

#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_axial_sagittal_coronal() {
        let cycle: Vec<_> = (0..6).map(Orientation::round_robin).collect();
        assert_eq!(
            cycle,
            vec![
                Orientation::Axial,
                Orientation::Sagittal,
                Orientation::Coronal,
                Orientation::Axial,
                Orientation::Sagittal,
                Orientation::Coronal,
            ]
        );
    }

    #[test]
    fn normal_axes_are_distinct() {
        assert_eq!(Orientation::Sagittal.normal_axis(), 0);
        assert_eq!(Orientation::Coronal.normal_axis(), 1);
        assert_eq!(Orientation::Axial.normal_axis(), 2);
    }
}
