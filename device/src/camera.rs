use anari_cycles_core::DataType;
use anari_cycles_core::math::{Mat4, Vec3, mat4_from_basis, radians};

use crate::native::scene::{CameraType, NativeScene, UpdateFlags, Viewplane};
use crate::object::{Object, ObjectBase, warn_unknown_subtype};

/// Projection of a camera subtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraKind {
    Perspective { fovy: f32, aspect: f32 },
    Orthographic { height: f32, aspect: f32 },
    Unknown,
}

/// A pinhole or orthographic view.
#[derive(Debug, Clone)]
pub struct Camera {
    base: ObjectBase,
    kind: CameraKind,
    position: Vec3,
    direction: Vec3,
    up: Vec3,
}

impl Camera {
    pub fn new(subtype: &str) -> Self {
        let kind = match subtype {
            "perspective" => CameraKind::Perspective {
                fovy: radians(60.0),
                aspect: 1.0,
            },
            "orthographic" => CameraKind::Orthographic {
                height: 1.0,
                aspect: 1.0,
            },
            _ => {
                warn_unknown_subtype(DataType::Camera, subtype);
                CameraKind::Unknown
            }
        };
        Self {
            base: ObjectBase::new(DataType::Camera, subtype),
            kind,
            position: Vec3::zeros(),
            direction: Vec3::z(),
            up: Vec3::y(),
        }
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.kind != CameraKind::Unknown
    }

    /// Camera-to-world transform looking along `+Z`.
    pub fn matrix(&self) -> Mat4 {
        let dir = self.direction.try_normalize(0.0).unwrap_or_else(Vec3::z);
        let up = self.up.try_normalize(0.0).unwrap_or_else(Vec3::y);
        let s = dir.cross(&up).try_normalize(0.0).unwrap_or_else(Vec3::x);
        let u = s.cross(&dir).normalize();
        mat4_from_basis(s, u, dir, self.position)
    }

    /// Pushes this camera into the native scene for a `width`×`height` image.
    pub fn make_current(&self, scene: &mut NativeScene, width: u32, height: u32) {
        let camera = &mut scene.camera;
        camera.matrix = self.matrix();
        camera.full_width = width;
        camera.full_height = height;
        match self.kind {
            CameraKind::Perspective { fovy, aspect } => {
                camera.camera_type = CameraType::Perspective;
                camera.fov = fovy;
                camera.viewplane = Viewplane {
                    left: -aspect,
                    right: aspect,
                    bottom: -1.0,
                    top: 1.0,
                };
            }
            CameraKind::Orthographic { height, aspect } => {
                let scale = height / 2.0;
                camera.camera_type = CameraType::Orthographic;
                camera.viewplane = Viewplane {
                    left: -aspect * scale,
                    right: aspect * scale,
                    bottom: -scale,
                    top: scale,
                };
            }
            CameraKind::Unknown => {}
        }
        scene.tag_update(UpdateFlags::CAMERA);
    }
}

impl Object for Camera {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn commit_parameters(&mut self) {
        let params = self.base.params();
        self.position = params.get_or("position", Vec3::zeros());
        self.direction = params.get_or("direction", Vec3::z());
        self.up = params.get_or("up", Vec3::y());
        self.kind = match self.kind {
            CameraKind::Perspective { .. } => CameraKind::Perspective {
                fovy: params.get_or("fovy", radians(60.0)),
                aspect: params.get_or("aspect", 1.0),
            },
            CameraKind::Orthographic { .. } => CameraKind::Orthographic {
                height: params.get_or("height", 1.0),
                aspect: params.get_or("aspect", 1.0),
            },
            CameraKind::Unknown => CameraKind::Unknown,
        };
    }

    fn is_unknown(&self) -> bool {
        self.kind == CameraKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anari_cycles_core::math::transform_vector;

    #[test]
    fn test_matrix_basis() {
        let mut camera = Camera::new("perspective");
        camera.base_mut().params_mut().set("position", [1.0f32, 2.0, 3.0].into());
        camera.base_mut().params_mut().set("direction", [0.0f32, 0.0, -2.0].into());
        camera.commit_parameters();

        let m = camera.matrix();
        let forward = transform_vector(&m, &Vec3::z());
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-6);
        assert_eq!(m[(0, 3)], 1.0);
        assert_eq!(m[(2, 3)], 3.0);
    }

    #[test]
    fn test_perspective_viewplane() {
        let mut camera = Camera::new("perspective");
        camera.base_mut().params_mut().set("aspect", 2.0f32.into());
        camera.commit_parameters();

        let mut scene = NativeScene::new();
        camera.make_current(&mut scene, 20, 10);
        assert_eq!(scene.camera.camera_type, CameraType::Perspective);
        assert_eq!(scene.camera.viewplane.left, -2.0);
        assert_eq!(scene.camera.viewplane.top, 1.0);
        assert_eq!(scene.camera.full_width, 20);
    }

    #[test]
    fn test_orthographic_viewplane() {
        let mut camera = Camera::new("orthographic");
        camera.base_mut().params_mut().set("height", 4.0f32.into());
        camera.commit_parameters();

        let mut scene = NativeScene::new();
        camera.make_current(&mut scene, 10, 10);
        assert_eq!(scene.camera.camera_type, CameraType::Orthographic);
        assert_eq!(scene.camera.viewplane.bottom, -2.0);
        assert_eq!(scene.camera.viewplane.right, 2.0);
    }

    #[test]
    fn test_unknown_subtype() {
        let camera = Camera::new("fisheye");
        assert!(!camera.is_valid());
        assert!(camera.is_unknown());
    }
}
