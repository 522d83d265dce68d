//! Throughput smoke harness, motivated by the benchmark driver at the
//! bottom of the original `geocache.py`: create N points on one
//! app/subject, time a batch of `UpdatePoint` calls, then a batch of
//! `NearestPoints` calls. Not part of the core contract -- a dev tool
//! exercising the crate's own public API instead of duck-typed tuples.

use std::time::Instant;

use sx9_geo_index::{GeoApi, GeoCoord, GeoWorld, ManagementApi, SubjectTag};

const NUM_POINTS: usize = 5_000;
const MAX_ZOOM: u8 = 16;
const SUBJECT: &str = "bench-subject";

fn main() -> anyhow::Result<()> {
    let world = GeoWorld::new();
    let app_token = ManagementApi::create_app(&world, "bench-app", MAX_ZOOM)?;

    let mut update_tokens = Vec::with_capacity(NUM_POINTS);
    for i in 0..NUM_POINTS {
        let point_id = format!("p{i}");
        ManagementApi::create_point(&world, &app_token, &point_id)?;
        ManagementApi::set_point_subjects(
            &world,
            &app_token,
            &point_id,
            vec![SubjectTag {
                subject_id: SUBJECT.to_string(),
                priority: (i % 100) as f64 / 100.0,
            }],
        )?;
        update_tokens.push((
            point_id.clone(),
            ManagementApi::get_update_point_auth_token(&world, &app_token, &point_id)?,
        ));
    }

    let started = Instant::now();
    for (i, (_point_id, token)) in update_tokens.iter().enumerate() {
        let lat = -90.0 + 180.0 * (i as f64 / NUM_POINTS as f64);
        let lon = -180.0 + 360.0 * ((i * 7) % NUM_POINTS) as f64 / NUM_POINTS as f64;
        GeoApi::update_point(&world, token, GeoCoord::new(lat, lon, 0.0))?;
    }
    let update_elapsed = started.elapsed();

    let nearest_token = ManagementApi::get_nearest_points_auth_token(
        &world,
        &app_token,
        &update_tokens[0].0,
        SUBJECT,
    )?;

    let started = Instant::now();
    let queries = 1_000;
    for i in 0..queries {
        let lat = -90.0 + 180.0 * (i as f64 / queries as f64);
        let lon = -180.0 + 360.0 * ((i * 11) % queries) as f64 / queries as f64;
        GeoApi::nearest_points(
            &world,
            &nearest_token,
            Some(GeoCoord::new(lat, lon, 0.0)),
            None,
            Some(50),
        )?;
    }
    let query_elapsed = started.elapsed();

    println!(
        "updates: {NUM_POINTS} in {:?} ({:.0} updates/sec)",
        update_elapsed,
        NUM_POINTS as f64 / update_elapsed.as_secs_f64()
    );
    println!(
        "queries: {queries} in {:?} ({:.0} queries/sec)",
        query_elapsed,
        queries as f64 / query_elapsed.as_secs_f64()
    );
    println!("cache metrics: {:?}", world.cache.metrics());

    Ok(())
}
