use avian3d::prelude::*;
use bevy::prelude::*;
use bevy_enhanced_input::prelude::*;
use bevy_leap::prelude::*;

fn main() -> AppExit {
    App::new()
        .add_plugins((
            DefaultPlugins,
            PhysicsPlugins::default(),
            EnhancedInputPlugin,
            LeapPlugin::default(),
        ))
        .add_input_context::<PlayerInput>()
        .add_systems(Startup, setup)
        .add_observer(report_crush)
        .run()
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) -> Result {
    // Spawn the player. The body itself is invisible; the mesh lives on a renderer child
    // so it can turn toward the walking direction independently.
    let player = commands
        .spawn((
            Platformer3d::default(),
            GameRigidBody::new(BodyShape::capsule(0.5, 2.0))?.with_crush_notifications(),
            Transform::from_xyz(0.0, 3.0, 0.0),
            Visibility::default(),
            PlayerInput,
            actions!(PlayerInput[
                (
                    Action::<Movement>::new(),
                    DeadZone::default(),
                    Bindings::spawn((
                        Cardinal::wasd_keys(),
                        Axial::left_stick()
                    ))
                ),
                (
                    Action::<Jump>::new(),
                    bindings![KeyCode::Space, GamepadButton::South],
                ),
                (
                    // Radians per second
                    Action::<Turn>::new(),
                    Scale::splat(2.5),
                    bindings![KeyCode::KeyQ, (KeyCode::KeyE, Negate::all())],
                ),
            ]),
        ))
        .id();

    commands.spawn((
        RendererOf(player),
        ChildOf(player),
        Transform::default(),
        Mesh3d(meshes.add(Capsule3d::new(0.5, 1.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.8, 0.7, 0.6))),
    ));

    // A dark disc that tracks the ground below the player, even mid-jump.
    commands.spawn((
        BodyShadow::new(player).with_speed(30.0),
        Mesh3d(meshes.add(Cylinder::new(0.45, 0.02))),
        MeshMaterial3d(materials.add(Color::srgba(0.0, 0.0, 0.0, 0.5))),
    ));

    // The camera follows the body's heading, not the renderer's.
    commands.spawn((
        Camera3d::default(),
        ChildOf(player),
        Transform::from_xyz(0.0, 3.0, 9.0).looking_at(Vec3::new(0.0, 0.5, 0.0), Vec3::Y),
    ));

    commands.spawn((
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(vec3(1.0, -2.0, -2.0), Vec3::Y),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
    ));

    let ground = materials.add(Color::srgb(0.3, 0.5, 0.3));
    let stone = materials.add(Color::srgb(0.55, 0.55, 0.6));
    let mut block =
        |commands: &mut Commands, size: Vec3, center: Vec3, material: &Handle<StandardMaterial>| {
            commands.spawn((
                RigidBody::Static,
                Collider::cuboid(size.x, size.y, size.z),
                Mesh3d(meshes.add(Cuboid::from_size(size))),
                MeshMaterial3d(material.clone()),
                Transform::from_translation(center),
            ));
        };

    // Floor
    block(&mut commands, vec3(60.0, 1.0, 60.0), vec3(0.0, -0.5, 0.0), &ground);

    // A staircase of 0.2 high steps, climbable without jumping
    for i in 0..8 {
        let height = 0.2 * (i + 1) as f32;
        block(
            &mut commands,
            vec3(3.0, height, 0.6),
            vec3(6.0, height / 2.0, -3.0 - 0.6 * i as f32),
            &stone,
        );
    }

    // A platform to jump onto and slip off the edge of
    block(&mut commands, vec3(4.0, 2.0, 4.0), vec3(-6.0, 1.0, -6.0), &stone);

    // A wall to slide along
    block(&mut commands, vec3(0.5, 3.0, 16.0), vec3(-12.0, 1.5, 0.0), &stone);
    Ok(())
}

fn report_crush(crushed: On<Crushed>) {
    warn!("{} is stuck inside {}", crushed.entity, crushed.obstacle);
}

#[derive(Component, Default)]
pub(crate) struct PlayerInput;
