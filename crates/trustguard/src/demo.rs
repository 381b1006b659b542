//! Synthetic captures for exercising a configured pipeline end to end.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trustguard_core::{Capture, Context, FaceBox, Frame, PolicyDecision};

use crate::error::RootResult;
use crate::RootState;

const SIZE: u32 = 64;
const FRAMES: usize = 30;
const GENUINE_APP: &str = "com.trustguard.bank";

pub struct Scenario {
    pub name: &'static str,
    pub capture: Capture,
    pub context: Context,
}

fn face() -> Option<FaceBox> {
    Some(FaceBox::new(16, 16, 32, 32))
}

/// High-contrast texture with a little per-frame sensor noise. `inverted`
/// flips the pattern, which reads as an abrupt cut between frames.
fn textured(rng: &mut StdRng, inverted: bool) -> RootResult<Frame> {
    let pixels = (0..SIZE)
        .flat_map(|y| (0..SIZE).map(move |x| (x, y)))
        .map(|(x, y)| {
            let light = ((x / 2 + y / 2) % 2 == 0) != inverted;
            let base: i16 = if light { 220 } else { 30 };
            (base + rng.gen_range(-3i16..=3)).clamp(0, 255) as u8
        })
        .collect();
    Ok(Frame::gray(SIZE, SIZE, pixels)?)
}

/// Steady texture, as from a live camera.
fn steady(rng: &mut StdRng) -> RootResult<Vec<(Frame, Option<FaceBox>)>> {
    (0..FRAMES)
        .map(|_| -> RootResult<_> { Ok((textured(rng, false)?, face())) })
        .collect()
}

/// Periodic hard cuts, as from spliced or replayed footage.
fn spliced(rng: &mut StdRng) -> RootResult<Vec<(Frame, Option<FaceBox>)>> {
    (0..FRAMES)
        .map(|i| -> RootResult<_> { Ok((textured(rng, i % 6 == 0)?, face())) })
        .collect()
}

fn flat() -> RootResult<Vec<(Frame, Option<FaceBox>)>> {
    (0..FRAMES)
        .map(|_| -> RootResult<_> {
            Ok((Frame::gray(SIZE, SIZE, vec![128; (SIZE * SIZE) as usize])?, face()))
        })
        .collect()
}

fn capture(frames: Vec<(Frame, Option<FaceBox>)>, package: &str) -> RootResult<Capture> {
    Ok(Capture::builder()
        .frames(frames)
        .package_name(package)
        .build()?)
}

/// The demo scenarios, deterministic for a given seed.
pub fn scenarios(seed: u64) -> RootResult<Vec<Scenario>> {
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(vec![
        Scenario {
            name: "genuine",
            capture: capture(steady(&mut rng)?, GENUINE_APP)?,
            context: Context::for_user("alice"),
        },
        Scenario {
            name: "spliced",
            capture: capture(spliced(&mut rng)?, GENUINE_APP)?,
            context: Context::for_user("bob"),
        },
        Scenario {
            name: "no_frames",
            capture: Capture::builder().package_name(GENUINE_APP).build()?,
            context: Context::for_user("carol"),
        },
        Scenario {
            name: "blurry",
            capture: capture(flat()?, GENUINE_APP)?,
            context: Context::for_user("dave"),
        },
        Scenario {
            name: "cloned_app",
            capture: capture(steady(&mut rng)?, "com.evil.clone")?,
            context: Context::for_user("erin"),
        },
        Scenario {
            name: "blocklisted",
            capture: capture(steady(&mut rng)?, GENUINE_APP)?,
            context: Context::for_user("user_fraud_123"),
        },
        Scenario {
            name: "allowlisted",
            capture: capture(spliced(&mut rng)?, GENUINE_APP)?,
            context: Context::for_user("admin_superuser"),
        },
    ])
}

/// Runs every scenario through `state.orchestrator`.
pub async fn run(state: &RootState, seed: u64) -> RootResult<Vec<(&'static str, PolicyDecision)>> {
    let mut outcomes = Vec::new();
    for scenario in scenarios(seed)? {
        let (decision, _) = state
            .orchestrator
            .assess_verification(scenario.capture, scenario.context)
            .await;
        outcomes.push((scenario.name, decision));
    }
    Ok(outcomes)
}
