//! Object handles and the state shared by every ANARI object.
//!
//! Objects live in per-category arenas owned by the
//! [`ObjectStore`](crate::store::ObjectStore). References between objects
//! are [`ObjectHandle`]s, checked for liveness when they are used.

use anari_cycles_core::DataType;
use anari_cycles_core::arena::Handle;
use anari_cycles_core::timestamp::TimeStamp;

use crate::array::Array;
use crate::camera::Camera;
use crate::frame::Frame;
use crate::geometry::Geometry;
use crate::group::Group;
use crate::instance::Instance;
use crate::light::Light;
use crate::material::Material;
use crate::params::{ParamValue, ParameterSet};
use crate::renderer::Renderer;
use crate::sampler::Sampler;
use crate::spatial_field::SpatialField;
use crate::surface::Surface;
use crate::volume::Volume;
use crate::world::World;

pub type ArrayHandle = Handle<Array>;
pub type CameraHandle = Handle<Camera>;
pub type GeometryHandle = Handle<Geometry>;
pub type LightHandle = Handle<Light>;
pub type MaterialHandle = Handle<Material>;
pub type SamplerHandle = Handle<Sampler>;
pub type SpatialFieldHandle = Handle<SpatialField>;
pub type VolumeHandle = Handle<Volume>;
pub type SurfaceHandle = Handle<Surface>;
pub type GroupHandle = Handle<Group>;
pub type InstanceHandle = Handle<Instance>;
pub type WorldHandle = Handle<World>;
pub type RendererHandle = Handle<Renderer>;
pub type FrameHandle = Handle<Frame>;

/// Handle to any ANARI object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectHandle {
    Array(ArrayHandle),
    Camera(CameraHandle),
    Geometry(GeometryHandle),
    Light(LightHandle),
    Material(MaterialHandle),
    Sampler(SamplerHandle),
    SpatialField(SpatialFieldHandle),
    Volume(VolumeHandle),
    Surface(SurfaceHandle),
    Group(GroupHandle),
    Instance(InstanceHandle),
    World(WorldHandle),
    Renderer(RendererHandle),
    Frame(FrameHandle),
}

macro_rules! object_handle_conversions {
    ($($variant:ident($ty:ty) => $getter:ident),* $(,)?) => {
        $(
            impl From<$ty> for ObjectHandle {
                fn from(h: $ty) -> Self {
                    ObjectHandle::$variant(h)
                }
            }

            impl From<$ty> for ParamValue {
                fn from(h: $ty) -> Self {
                    ParamValue::Object(ObjectHandle::$variant(h))
                }
            }
        )*

        impl ObjectHandle {
            $(
                pub fn $getter(&self) -> Option<$ty> {
                    match self {
                        ObjectHandle::$variant(h) => Some(*h),
                        _ => None,
                    }
                }
            )*
        }
    };
}

object_handle_conversions! {
    Array(ArrayHandle) => as_array,
    Camera(CameraHandle) => as_camera,
    Geometry(GeometryHandle) => as_geometry,
    Light(LightHandle) => as_light,
    Material(MaterialHandle) => as_material,
    Sampler(SamplerHandle) => as_sampler,
    SpatialField(SpatialFieldHandle) => as_spatial_field,
    Volume(VolumeHandle) => as_volume,
    Surface(SurfaceHandle) => as_surface,
    Group(GroupHandle) => as_group,
    Instance(InstanceHandle) => as_instance,
    World(WorldHandle) => as_world,
    Renderer(RendererHandle) => as_renderer,
    Frame(FrameHandle) => as_frame,
}

impl ObjectHandle {
    /// ANARI type category. Arrays report `Array1D` whatever their rank.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Array(_) => DataType::Array1D,
            Self::Camera(_) => DataType::Camera,
            Self::Geometry(_) => DataType::Geometry,
            Self::Light(_) => DataType::Light,
            Self::Material(_) => DataType::Material,
            Self::Sampler(_) => DataType::Sampler,
            Self::SpatialField(_) => DataType::SpatialField,
            Self::Volume(_) => DataType::Volume,
            Self::Surface(_) => DataType::Surface,
            Self::Group(_) => DataType::Group,
            Self::Instance(_) => DataType::Instance,
            Self::World(_) => DataType::World,
            Self::Renderer(_) => DataType::Renderer,
            Self::Frame(_) => DataType::Frame,
        }
    }

    /// Flush order: objects are finalized after everything they can reference.
    pub fn flush_priority(&self) -> u8 {
        match self {
            Self::Array(_) => 0,
            Self::SpatialField(_) => 1,
            Self::Sampler(_) => 2,
            Self::Geometry(_) => 3,
            Self::Material(_) => 4,
            Self::Light(_) => 5,
            Self::Camera(_) => 6,
            Self::Volume(_) => 7,
            Self::Surface(_) => 8,
            Self::Group(_) => 9,
            Self::Instance(_) => 10,
            Self::World(_) => 11,
            Self::Renderer(_) => 12,
            Self::Frame(_) => 13,
        }
    }

    /// Whether committing this object changes what the world instantiates.
    pub fn affects_scene(&self) -> bool {
        matches!(
            self,
            Self::Surface(_) | Self::Volume(_) | Self::Group(_) | Self::Instance(_) | Self::World(_)
        )
    }
}

/// Lowercase category name used in diagnostics.
pub fn type_label(ty: DataType) -> &'static str {
    match ty {
        DataType::Array1D | DataType::Array2D | DataType::Array3D => "array",
        DataType::Camera => "camera",
        DataType::Frame => "frame",
        DataType::Geometry => "geometry",
        DataType::Group => "group",
        DataType::Instance => "instance",
        DataType::Light => "light",
        DataType::Material => "material",
        DataType::Renderer => "renderer",
        DataType::Sampler => "sampler",
        DataType::SpatialField => "spatial field",
        DataType::Surface => "surface",
        DataType::Volume => "volume",
        DataType::World => "world",
        _ => "object",
    }
}

/// State common to every object.
#[derive(Debug, Clone)]
pub struct ObjectBase {
    data_type: DataType,
    subtype: String,
    params: ParameterSet,
    last_commit: TimeStamp,
}

impl ObjectBase {
    pub fn new(data_type: DataType, subtype: &str) -> Self {
        Self {
            data_type,
            subtype: subtype.to_string(),
            params: ParameterSet::new(),
            last_commit: 0,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    /// Stamp of the last finalize, `0` if never finalized.
    pub fn last_commit(&self) -> TimeStamp {
        self.last_commit
    }

    pub(crate) fn mark_committed(&mut self, stamp: TimeStamp) {
        self.last_commit = stamp;
    }
}

/// Behavior shared by every object category.
pub trait Object {
    fn base(&self) -> &ObjectBase;

    fn base_mut(&mut self) -> &mut ObjectBase;

    /// Captures parameter values into local fields. Touches no native state.
    fn commit_parameters(&mut self);

    /// Objects whose changes must re-finalize this one.
    fn observed(&self) -> Vec<ObjectHandle> {
        Vec::new()
    }

    /// Committed references that keep other objects alive.
    fn referenced(&self) -> Vec<ObjectHandle> {
        self.observed()
    }

    /// Whether this is an unknown-subtype sentinel.
    fn is_unknown(&self) -> bool {
        false
    }

    /// Logs a warning when a sentinel is encountered in the scene.
    fn warn_if_unknown(&self) {
        if self.is_unknown() {
            let base = self.base();
            log::warn!(
                "encountered unknown {} object of subtype '{}'",
                type_label(base.data_type()),
                base.subtype()
            );
        }
    }
}

/// Logs creation of an unknown-subtype sentinel.
pub(crate) fn warn_unknown_subtype(data_type: DataType, subtype: &str) {
    log::warn!(
        "created unknown {} object of subtype '{}'",
        type_label(data_type),
        subtype
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use anari_cycles_core::Arena;

    #[test]
    fn test_flush_priority_orders_dependencies() {
        let mut surfaces: Arena<Surface> = Arena::new();
        let mut groups: Arena<Group> = Arena::new();
        let s = ObjectHandle::from(surfaces.insert(Surface::new()));
        let g = ObjectHandle::from(groups.insert(Group::new()));
        assert!(s.flush_priority() < g.flush_priority());
        assert_eq!(s.data_type(), DataType::Surface);
        assert!(s.as_surface().is_some());
        assert!(s.as_world().is_none());
    }

    #[test]
    fn test_base_tracks_commit() {
        let mut base = ObjectBase::new(DataType::Camera, "perspective");
        assert_eq!(base.last_commit(), 0);
        base.mark_committed(7);
        assert_eq!(base.last_commit(), 7);
        assert_eq!(base.subtype(), "perspective");
        assert_eq!(type_label(base.data_type()), "camera");
    }
}
