//! Cornell Box 场景
//!
//! 五面墙由 [`Quad`] 拼成，盒子内部放两个 [`Cube`]，天花板下方是一块矩形面光源。

use glam::{Quat, Vec2, Vec3};
use prism_scene::components::camera::CameraComponent;
use prism_scene::components::light::LightComponent;
use prism_scene::components::material::MaterialComponent;
use prism_scene::components::mesh::MeshData;
use prism_scene::components::transform::TransformComponent;
use prism_scene::gpu_scene::GpuScene;
use prism_scene::shapes::cube::Cube;
use prism_scene::shapes::quad::Quad;
use std::f32::consts::FRAC_PI_2;

/// 场景中各个对象的 id，方便之后修改
pub struct CornellScene {
    pub walls: Vec<u32>,
    pub boxes: Vec<u32>,
    pub light: u32,
    pub light_instance: u32,
}
impl CornellScene {
    const LIGHT_COLOR: Vec3 = Vec3::new(1.0, 0.85, 0.6);
    const LIGHT_INTENSITY: f32 = 12.0;

    pub fn create(scene: &mut GpuScene) -> Self {
        let _span = tracy_client::span!("CornellScene::create");
        log::info!("Loading cornell scene...");

        scene.add_camera(CameraComponent::look_at(Vec3::new(0.0, 0.0, 3.4), Vec3::ZERO).with_fov(45.0));

        let white = scene.add_material(&MaterialComponent::diffuse(Vec3::splat(0.73)));
        let red = scene.add_material(&MaterialComponent::diffuse(Vec3::new(0.65, 0.05, 0.05)));
        let green = scene.add_material(&MaterialComponent::diffuse(Vec3::new(0.12, 0.45, 0.15)));

        // 同一份几何不能绑定不同的材质，每种颜色各一份
        let white_quad = Self::add_mesh_with_material(scene, Quad::mesh_data, white);
        let red_quad = Self::add_mesh_with_material(scene, Quad::mesh_data, red);
        let green_quad = Self::add_mesh_with_material(scene, Quad::mesh_data, green);
        let white_cube = Self::add_mesh_with_material(scene, Cube::mesh_data, white);

        // 法线全部朝向盒子内部
        let walls = [
            (white_quad, Vec3::new(0.0, -1.0, 0.0), Quat::from_rotation_x(-FRAC_PI_2)),
            (white_quad, Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_x(FRAC_PI_2)),
            (white_quad, Vec3::new(0.0, 0.0, -1.0), Quat::IDENTITY),
            (red_quad, Vec3::new(-1.0, 0.0, 0.0), Quat::from_rotation_y(FRAC_PI_2)),
            (green_quad, Vec3::new(1.0, 0.0, 0.0), Quat::from_rotation_y(-FRAC_PI_2)),
        ]
        .into_iter()
        .map(|(mesh, translation, rotation)| {
            Self::add_instance(scene, mesh, TransformComponent::from_trs(translation, rotation, Vec3::ONE))
        })
        .collect();

        let boxes = [
            (Vec3::new(-0.35, -0.4, -0.3), 0.3, Vec3::new(0.3, 0.6, 0.3)),
            (Vec3::new(0.35, -0.7, 0.25), -0.3, Vec3::splat(0.3)),
        ]
        .into_iter()
        .map(|(translation, yaw, scale)| {
            let transform = TransformComponent::from_trs(translation, Quat::from_rotation_y(yaw), scale);
            Self::add_instance(scene, white_cube, transform)
        })
        .collect();

        // 面光源：几何体与光源共享一个 transform
        let light_mesh = scene.add_static_mesh(Quad::light_mesh_data());
        let light = scene.add_light(&LightComponent::rect(Vec2::splat(2.0), Self::LIGHT_COLOR, Self::LIGHT_INTENSITY));
        let light_transform = scene.add_transform(&TransformComponent::from_trs(
            Vec3::new(0.0, 0.98, 0.0),
            Quat::IDENTITY,
            Vec3::new(0.25, 1.0, 0.25),
        ));
        let light_instance = scene.register_instance();
        scene.set_instance_mesh_id(light_instance, light_mesh);
        scene.set_instance_light_id(light_instance, light);
        scene.bind_transform(light_instance, light_transform);
        scene.bind_light_transform(light, light_transform);

        // 一点点环境光，避免完全看不到的角落
        scene.add_light(&LightComponent::ambient(Vec3::ONE, 0.02));

        log::info!("Cornell scene loaded: {} instances.", scene.instance_count());
        Self {
            walls,
            boxes,
            light,
            light_instance,
        }
    }

    fn add_mesh_with_material(scene: &mut GpuScene, mesh_data: fn() -> MeshData, material: u32) -> u32 {
        let mesh = scene.add_static_mesh(mesh_data());
        scene.set_static_mesh_material(mesh, material);
        mesh
    }

    fn add_instance(scene: &mut GpuScene, mesh: u32, transform: TransformComponent) -> u32 {
        let instance = scene.register_instance();
        scene.set_instance_mesh_id(instance, mesh);
        let transform = scene.add_transform(&transform);
        scene.bind_transform(instance, transform);
        instance
    }
}
