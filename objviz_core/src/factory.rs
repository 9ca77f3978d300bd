//! Primitive Factory: one pure function per marker category.
//!
//! Each call returns [`Emission::Produced`] or [`Emission::Skipped`] with
//! the failed precondition. Nothing here panics or returns an error, so the
//! assembler can emit category after category without special cases.

use crate::config::DisplayConfig;
use crate::geometry::GeometryBuilder;
use crate::marker_id::MarkerCategory;
use crate::object::{PerceivedObject, Pose, PredictedPath};
use crate::palette::ClassificationPalette;
use crate::primitive::{Emission, Payload, PrimitiveBody, Rgba, SkipReason};
use nalgebra::{UnitQuaternion, Vector3};

/// m/s → km/h
const MPS_TO_KMPH: f64 = 3.6;

/// Lowest alpha of a path; confidence 1.0 maps to fully opaque.
const MIN_PATH_ALPHA: f64 = 0.3;

pub struct PrimitiveFactory<G, P> {
    geometry: G,
    palette: P,
    config: DisplayConfig,
}

impl<G: GeometryBuilder, P: ClassificationPalette> PrimitiveFactory<G, P> {
    pub fn new(geometry: G, palette: P, config: DisplayConfig) -> Self {
        Self {
            geometry,
            palette,
            config,
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn line_scale(&self) -> Vector3<f64> {
        Vector3::new(self.config.line_width, 0.0, 0.0)
    }

    fn text_scale(&self) -> Vector3<f64> {
        Vector3::new(0.0, 0.0, self.config.text_height)
    }

    fn object_color(&self, object: &PerceivedObject) -> Rgba {
        self.palette.color_for(object.label())
    }

    fn text_body(&self, category: MarkerCategory, pose: Pose, color: Rgba, text: String) -> Emission {
        Emission::Produced(PrimitiveBody {
            category,
            pose,
            scale: self.text_scale(),
            color,
            payload: Payload::Text { text },
        })
    }

    /// Text anchor at an object-local offset, upright in the parent frame.
    fn offset_anchor(object: &PerceivedObject, local_offset: &Vector3<f64>) -> Pose {
        let pose = &object.pose.pose;
        Pose::new(
            pose.position + pose.rotate_vector(local_offset),
            UnitQuaternion::identity(),
        )
    }

    // ========================================================================
    // PER-OBJECT CATEGORIES
    // ========================================================================

    pub fn shape(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_shape {
            return Emission::Skipped(SkipReason::Disabled);
        }
        match self.geometry.shape_outline(&object.shape, &object.pose.pose) {
            Ok(points) => Emission::Produced(PrimitiveBody {
                category: MarkerCategory::Shape,
                pose: object.pose.pose,
                scale: self.line_scale(),
                color: self.object_color(object),
                payload: Payload::LineList { points },
            }),
            Err(reason) => Emission::Skipped(reason),
        }
    }

    /// Highest-probability classification, at the object position.
    pub fn label(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_label {
            return Emission::Skipped(SkipReason::Disabled);
        }
        let anchor = Self::offset_anchor(object, &Vector3::zeros());
        let text = self.palette.label_text(object.label());
        self.text_body(MarkerCategory::Label, anchor, self.object_color(object), text)
    }

    /// Leading hex characters of the UUID, below the label.
    pub fn identity_tag(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_identity_tag {
            return Emission::Skipped(SkipReason::Disabled);
        }
        let anchor = Self::offset_anchor(object, &self.config.identity_tag_offset);
        let hex = object.object_id.simple().to_string();
        let text = hex[..self.config.identity_tag_chars.min(hex.len())].to_string();
        self.text_body(MarkerCategory::IdentityTag, anchor, Rgba::WHITE, text)
    }

    pub fn covariance(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_covariance {
            return Emission::Skipped(SkipReason::Disabled);
        }
        match self
            .geometry
            .covariance_ellipse(&object.pose, self.config.covariance_sigma)
        {
            Ok(points) => Emission::Produced(PrimitiveBody {
                category: MarkerCategory::CovarianceEllipse,
                pose: object.pose.pose,
                scale: self.line_scale(),
                color: self.object_color(object).with_alpha(0.6),
                payload: Payload::LineStrip { points },
            }),
            Err(reason) => Emission::Skipped(reason),
        }
    }

    /// Speed in km/h, stacked below the identity tag.
    pub fn velocity_text(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_velocity_text {
            return Emission::Skipped(SkipReason::Disabled);
        }
        let Some(twist) = &object.twist else {
            return Emission::Skipped(SkipReason::MissingTwist);
        };
        let speed = twist.twist.speed();
        if !speed.is_finite() {
            return Emission::Skipped(SkipReason::MissingTwist);
        }
        let offset = self.config.identity_tag_offset + self.config.velocity_text_offset;
        let anchor = Self::offset_anchor(object, &offset);
        let text = format!("{:.2} [km/h]", speed * MPS_TO_KMPH);
        self.text_body(MarkerCategory::VelocityText, anchor, Rgba::WHITE, text)
    }

    pub fn velocity_vector(&self, object: &PerceivedObject) -> Emission {
        if !self.config.show_velocity_vector {
            return Emission::Skipped(SkipReason::Disabled);
        }
        let Some(twist) = &object.twist else {
            return Emission::Skipped(SkipReason::MissingTwist);
        };
        let speed = twist.twist.speed();
        if !speed.is_finite() || speed < self.config.min_velocity {
            return Emission::Skipped(SkipReason::BelowMinVelocity);
        }
        let (tail, head) = self.geometry.velocity_arrow(
            &object.pose.pose,
            &twist.twist,
            self.config.velocity_arrow_seconds,
        );
        Emission::Produced(PrimitiveBody {
            category: MarkerCategory::VelocityVector,
            pose: object.pose.pose,
            scale: self.line_scale(),
            color: self.object_color(object),
            payload: Payload::Arrow { tail, head },
        })
    }

    // ========================================================================
    // PER-PATH CATEGORIES
    // ========================================================================

    fn path_visible(&self, path: &PredictedPath) -> bool {
        path.confidence >= self.config.path_confidence_threshold
    }

    /// Polyline through the path's waypoints. An empty path still yields a
    /// (pointless) strip so its ordinal stays occupied.
    pub fn trajectory(&self, object: &PerceivedObject, path: &PredictedPath) -> Emission {
        if !self.config.show_predicted_paths {
            return Emission::Skipped(SkipReason::Disabled);
        }
        if !self.path_visible(path) {
            return Emission::Skipped(SkipReason::LowConfidence);
        }
        let points = path.waypoints.iter().map(|p| p.position).collect();
        let alpha = MIN_PATH_ALPHA + (1.0 - MIN_PATH_ALPHA) * path.confidence.clamp(0.0, 1.0);
        Emission::Produced(PrimitiveBody {
            category: MarkerCategory::Trajectory,
            pose: object.pose.pose,
            scale: self.line_scale(),
            color: self.palette.path_color(&object.object_id).with_alpha(alpha as f32),
            payload: Payload::LineStrip { points },
        })
    }

    /// Confidence value at the path's last waypoint.
    pub fn trajectory_confidence(&self, object: &PerceivedObject, path: &PredictedPath) -> Emission {
        if !self.config.show_path_confidence {
            return Emission::Skipped(SkipReason::Disabled);
        }
        let Some(last) = path.waypoints.last() else {
            return Emission::Skipped(SkipReason::EmptyPath);
        };
        if !self.path_visible(path) {
            return Emission::Skipped(SkipReason::LowConfidence);
        }
        let anchor = Pose::new(last.position, UnitQuaternion::identity());
        let color = self.palette.path_color(&object.object_id);
        let text = format!("{:.3}", path.confidence);
        self.text_body(MarkerCategory::TrajectoryConfidence, anchor, color, text)
    }
}
