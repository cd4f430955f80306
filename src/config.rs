//! Build configuration for [`Bvh`] and [`SplitBvh`].
//!
//! Options can be set field by field or through the string keys used by scene
//! description front ends, e.g. `bvh.sah.num_bins`.
//!
//! [`Bvh`]: ../bvh/struct.Bvh.html
//! [`SplitBvh`]: ../bvh/struct.SplitBvh.html

use crate::error::BuildError;
use crate::Real;

/// Selects how the base builder picks split planes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BuilderKind {
    /// Split at the center of the centroid bounds along their largest axis.
    #[default]
    Median,
    /// Binned object surface area heuristic.
    Sah,
}

/// A value passed to [`BuildOptions::set_option`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Numeric option. Booleans are `0.0` / non-zero.
    Float(Real),
    /// Textual option, e.g. the builder name.
    String(String),
}

impl From<Real> for OptionValue {
    fn from(value: Real) -> Self {
        OptionValue::Float(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value as Real)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Float(if value { 1.0 } else { 0.0 })
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_owned())
    }
}

/// Parameters of a hierarchy build.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BuildOptions {
    /// Split selection of the base builder.
    pub builder: BuilderKind,

    /// Build a [`SplitBvh`] with spatial splits instead of a plain [`Bvh`].
    ///
    /// [`Bvh`]: ../bvh/struct.Bvh.html
    /// [`SplitBvh`]: ../bvh/struct.SplitBvh.html
    pub use_splits: bool,

    /// Cost of traversing an internal node relative to intersecting one primitive.
    pub traversal_cost: Real,

    /// Number of centroid bins of the object SAH.
    pub num_bins: usize,

    /// Number of spatial bins of the spatial SAH.
    pub spatial_bins: usize,

    /// Spatial splits are only evaluated for nodes above this depth.
    pub max_split_depth: u32,

    /// Minimum ratio of child overlap area to root area before a spatial split is tried.
    pub min_overlap: Real,

    /// Fraction of the primitive count that may be added as duplicated references.
    pub extra_ref_budget: Real,

    /// Nodes at this depth become leaves regardless of their size.
    pub max_depth: u32,

    /// Alternate the comparison direction of the partition between siblings.
    pub alternate_partition_direction: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            builder: BuilderKind::Median,
            use_splits: false,
            traversal_cost: 10.0,
            num_bins: 64,
            spatial_bins: 128,
            max_split_depth: 10,
            min_overlap: 0.0,
            extra_ref_budget: 0.5,
            max_depth: 64,
            alternate_partition_direction: true,
        }
    }
}

impl BuildOptions {
    /// Options for a binned SAH build without spatial splits.
    pub fn sah() -> Self {
        BuildOptions {
            builder: BuilderKind::Sah,
            ..Default::default()
        }
    }

    /// Options for a SAH build with spatial splits.
    pub fn split() -> Self {
        BuildOptions {
            builder: BuilderKind::Sah,
            use_splits: true,
            ..Default::default()
        }
    }

    /// Sets an option by its string key. On error the options are left unchanged.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::config::{BuildOptions, BuilderKind};
    ///
    /// let mut options = BuildOptions::default();
    /// options.set_option("bvh.builder", "sah").unwrap();
    /// options.set_option("bvh.sah.use_splits", true).unwrap();
    /// options.set_option("bvh.sah.num_bins", 32.0).unwrap();
    ///
    /// assert_eq!(options.builder, BuilderKind::Sah);
    /// assert!(options.use_splits);
    /// assert_eq!(options.num_bins, 32);
    /// assert!(options.set_option("bvh.unknown", 1.0).is_err());
    /// ```
    pub fn set_option(
        &mut self,
        name: &str,
        value: impl Into<OptionValue>,
    ) -> Result<(), BuildError> {
        let value = value.into();
        let mut next = self.clone();
        match name {
            "bvh.builder" => {
                next.builder = match as_str(name, &value)? {
                    "median" => BuilderKind::Median,
                    "sah" => BuilderKind::Sah,
                    other => return Err(invalid(name, format!("unknown builder `{other}`"))),
                }
            }
            "bvh.sah.use_splits" => next.use_splits = as_float(name, &value)? != 0.0,
            "bvh.sah.traversal_cost" => next.traversal_cost = as_float(name, &value)?,
            "bvh.sah.num_bins" => next.num_bins = as_count(name, &value)?,
            "bvh.sah.spatial_bins" => next.spatial_bins = as_count(name, &value)?,
            "bvh.sah.max_split_depth" => next.max_split_depth = as_count(name, &value)? as u32,
            "bvh.sah.min_overlap" => next.min_overlap = as_float(name, &value)?,
            "bvh.sah.extra_node_budget" => next.extra_ref_budget = as_float(name, &value)?,
            "bvh.max_depth" => next.max_depth = as_count(name, &value)? as u32,
            "bvh.partition.alternate" => {
                next.alternate_partition_direction = as_float(name, &value)? != 0.0
            }
            _ => return Err(BuildError::UnknownOption(name.to_owned())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Checks that every option lies in its usable range.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.num_bins < 2 {
            return Err(invalid("bvh.sah.num_bins", "at least 2 bins are required"));
        }
        if self.spatial_bins < 2 {
            return Err(invalid("bvh.sah.spatial_bins", "at least 2 bins are required"));
        }
        if !self.traversal_cost.is_finite() || self.traversal_cost < 0.0 {
            return Err(invalid(
                "bvh.sah.traversal_cost",
                "must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_overlap) {
            return Err(invalid("bvh.sah.min_overlap", "must lie in [0, 1]"));
        }
        if !self.extra_ref_budget.is_finite() || self.extra_ref_budget < 0.0 {
            return Err(invalid(
                "bvh.sah.extra_node_budget",
                "must be finite and non-negative",
            ));
        }
        if self.max_depth == 0 {
            return Err(invalid("bvh.max_depth", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> BuildError {
    BuildError::InvalidOption {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

fn as_float(name: &str, value: &OptionValue) -> Result<Real, BuildError> {
    match value {
        OptionValue::Float(v) => Ok(*v),
        OptionValue::String(_) => Err(invalid(name, "expected a number")),
    }
}

fn as_count(name: &str, value: &OptionValue) -> Result<usize, BuildError> {
    let v = as_float(name, value)?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
        Ok(v as usize)
    } else {
        Err(invalid(name, "expected a non-negative integer"))
    }
}

fn as_str<'a>(name: &str, value: &'a OptionValue) -> Result<&'a str, BuildError> {
    match value {
        OptionValue::String(s) => Ok(s.as_str()),
        OptionValue::Float(_) => Err(invalid(name, "expected a string")),
    }
}
