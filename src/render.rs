use std::io::IsTerminal;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::accel::{Hit, KdTree, MAX_TREE_DEPTH};
use crate::config::Options;
use crate::image::Image;
use crate::math::{degrees_to_radians, Color, Float, Ray, Vec3, PI};
use crate::scene::{Material, Scene};
use crate::tile::{bucket_schedule, region_schedule, single_schedule, Tile};

/// How the image plane is partitioned into tiles before the workers start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One tile covering the full image.
    Single,
    /// A ⌈√N⌉ × ⌈√N⌉ grid matched to the worker count.
    Region,
    /// Fixed square tiles of the scene's `bucket_size`.
    Bucket,
}

// ─── Render Statistics ──────────────────────────────────────────────────────

/// Aggregate statistics collected during the rendering pass.
pub struct RenderStats {
    pub total_rays: u64,
    pub elapsed_secs: f64,
    pub width: usize,
    pub height: usize,
    pub samples_per_pixel: usize,
}

impl RenderStats {
    pub fn mrays_per_sec(&self) -> f64 {
        self.total_rays as f64 / self.elapsed_secs / 1e6
    }

    pub fn log_summary(&self) {
        info!(
            "rendered {}×{} @ {} spp in {:.2}s ({:.2}M primary rays, {:.2} Mrays/s)",
            self.width,
            self.height,
            self.samples_per_pixel,
            self.elapsed_secs,
            self.total_rays as f64 / 1e6,
            self.mrays_per_sec()
        );
    }
}

// ─── Progress Reporter ──────────────────────────────────────────────────────

/// A tile-granularity progress bar on stderr, silent when stderr is not a
/// terminal.
struct ProgressBar {
    total: usize,
    done: usize,
    last_pct: usize,
    start: Instant,
    enabled: bool,
}

impl ProgressBar {
    fn new(total: usize) -> Self {
        Self {
            total: total.max(1),
            done: 0,
            last_pct: 0,
            start: Instant::now(),
            enabled: std::io::stderr().is_terminal(),
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        let pct = self.done * 100 / self.total;
        if self.enabled && pct != self.last_pct {
            let elapsed = self.start.elapsed().as_secs_f64();
            let rate = self.done as f64 / elapsed;
            let remaining = (self.total - self.done) as f64 / rate;
            let bar_width = 24;
            let filled = (pct * bar_width) / 100;
            let bar = format!("{}{}", "█".repeat(filled), "░".repeat(bar_width - filled));
            eprint!("\r  Rendering: │{bar}│ {pct:3}%  ETA {remaining:.0}s   ");
            self.last_pct = pct;
        }
    }

    fn finish(&self) {
        if self.enabled {
            let elapsed = self.start.elapsed().as_secs_f64();
            let bar = "█".repeat(24);
            eprintln!("\r  Rendering: │{bar}│ 100%  {elapsed:.2}s       ");
        }
    }
}

// ─── Refraction ─────────────────────────────────────────────────────────────

/// Snell refraction of the unit incident direction `i` about the unit normal
/// `n`, oriented so that `i·n ≤ 0`. Returns `None` on total internal
/// reflection.
pub fn refract_direction(i: Vec3, n: Vec3, eta_i: Float, eta_r: Float) -> Option<Vec3> {
    let cos_i = -i.dot(n);
    let sin_i = (1.0 - cos_i * cos_i).sqrt();

    if eta_r / eta_i < sin_i {
        return None;
    }

    let sin_r = sin_i * eta_i / eta_r;
    let cos_r = (1.0 - sin_r * sin_r).sqrt();
    Some(cos_r * (-n) + sin_r * (i + cos_i * n).normalized())
}

// ─── Per-Worker Tracer ──────────────────────────────────────────────────────

/// One worker's view of the render: shared read-only scene and accelerator,
/// plus the worker-owned RNG and preallocated traversal stack reused across
/// pixels so the hot loop never touches the allocator.
pub struct Tracer<'a> {
    accel: &'a KdTree,
    scene: &'a Scene,
    options: &'a Options,
    rng: SmallRng,
    stack: Vec<usize>,
}

impl<'a> Tracer<'a> {
    pub fn new(accel: &'a KdTree, options: &'a Options) -> Self {
        let rng = match options.fixed_rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            accel,
            scene: accel.scene(),
            options,
            rng,
            stack: Vec::with_capacity(2 * MAX_TREE_DEPTH),
        }
    }

    /// Generates one (possibly jittered) camera ray through pixel `(x, y)`.
    ///
    /// Raster → NDC → screen coordinates, aspect and FOV scaling, then the
    /// transposed camera matrix carries the camera-local direction into world
    /// space.
    fn camera_ray(&mut self, x: usize, y: usize, width: usize, height: usize) -> Ray {
        let mut raster_x = x as Float;
        let mut raster_y = y as Float;
        if self.options.samples_per_pixel == 1 {
            raster_x += 0.5;
            raster_y += 0.5;
        } else {
            raster_x += self.rng.gen::<Float>();
            raster_y += self.rng.gen::<Float>();
        }

        let ndc_x = raster_x / width as Float;
        let ndc_y = raster_y / height as Float;

        let mut screen_x = 2.0 * ndc_x - 1.0;
        let mut screen_y = 1.0 - 2.0 * ndc_y;

        screen_x *= width as Float / height as Float;

        let fov_scale = (degrees_to_radians(self.options.fov_degrees) / 2.0).tan();
        screen_x *= fov_scale;
        screen_y *= fov_scale;

        let camera = &self.scene.camera;
        let direction = camera
            .matrix
            .transposed()
            .mul_vec(Vec3::new(screen_x, screen_y, -1.0))
            .normalized();

        Ray::new(camera.position, direction)
    }

    /// Averages `samples_per_pixel` camera rays through pixel `(x, y)`.
    /// Camera rays cull backfaces; every secondary ray sees both sides.
    pub fn render_pixel(&mut self, x: usize, y: usize, width: usize, height: usize) -> Color {
        let mut color = Color::zero();
        for _ in 0..self.options.samples_per_pixel {
            let ray = self.camera_ray(x, y, width, height);
            color += match self
                .accel
                .closest_hit(&ray, true, self.options.epsilon, &mut self.stack)
            {
                Some(hit) => self.shade(&hit, 0),
                None => self.scene.settings.background_color,
            };
        }
        color / self.options.samples_per_pixel as Float
    }

    fn render_tile(&mut self, tile: Tile, width: usize, height: usize) -> Vec<Color> {
        let mut buf = Vec::with_capacity((tile.x1 - tile.x0) * (tile.y1 - tile.y0));
        for y in tile.y0..tile.y1 {
            for x in tile.x0..tile.x1 {
                buf.push(self.render_pixel(x, y, width, height));
            }
        }
        buf
    }

    /// The recursive ray→color function, dispatching on the hit material.
    pub fn shade(&mut self, hit: &Hit, depth: usize) -> Color {
        let scene = self.scene;

        if depth == self.options.max_ray_depth {
            return scene.settings.background_color;
        }

        let mesh = &scene.meshes[hit.mesh_idx];
        let material = &scene.materials[mesh.material_idx];

        match material {
            Material::Diffuse { albedo, smooth } => {
                let mut color = self.diffuse_bounces(hit, depth);
                color += self.direct_lighting(hit, *smooth, |_| *albedo);
                color / (self.options.diffuse_reflection_rays + 1) as Float
            }

            Material::Textured { texture, smooth } => {
                let texture = scene
                    .textures
                    .get(texture)
                    .expect("texture reference validated at scene load");
                self.direct_lighting(hit, *smooth, |h| {
                    texture.sample(h.u, h.v, h.w, &h.uvs)
                })
            }

            Material::Reflective { .. } => {
                let reflected = hit.ray.direction.reflect(hit.normal);
                let ray = Ray::new(
                    hit.position + self.options.reflection_bias * reflected,
                    reflected,
                );
                match self
                    .accel
                    .closest_hit(&ray, false, self.options.epsilon, &mut self.stack)
                {
                    Some(reflection_hit) => self.shade(&reflection_hit, depth + 1),
                    None => scene.settings.background_color,
                }
            }

            Material::Refractive { ior, smooth } => self.shade_refractive(hit, depth, *ior, *smooth),

            Material::Constant { albedo, .. } => *albedo,
        }
    }

    /// Direct illumination from every light: inverse-square falloff over the
    /// sphere surface, cosine law against the shading or face normal, and a
    /// shadow ray that walks through transmissive media.
    fn direct_lighting(
        &mut self,
        hit: &Hit,
        smooth: bool,
        surface_color: impl Fn(&Hit) -> Color,
    ) -> Color {
        let scene = self.scene;
        let mut color = Color::zero();

        for light in &scene.lights {
            let to_light = light.position - hit.position;
            let radius = to_light.length();
            let sphere_area = 4.0 * PI * radius * radius;
            let light_dir = to_light.normalized();

            let cosine = if smooth {
                light_dir.dot(hit.normal)
            } else {
                light_dir.dot(hit.face_normal)
            }
            .max(0.0);

            let shadow_ray = Ray::new(
                hit.position + self.options.shadow_bias * light_dir,
                light_dir,
            );
            if self.is_occluded(&shadow_ray, radius) {
                continue;
            }

            color += (light.intensity / sphere_area) * cosine * surface_color(hit);
        }

        color
    }

    /// Hemispheric diffuse bounces: an orthonormal basis around the shading
    /// normal, a direction sampled on the upper hemisphere, one recursion per
    /// configured ray. Disabled when `diffuse_reflection_rays` is 0.
    fn diffuse_bounces(&mut self, hit: &Hit, depth: usize) -> Color {
        let mut color = Color::zero();

        for _ in 0..self.options.diffuse_reflection_rays {
            let right = hit.ray.direction.cross(hit.normal).normalized();
            let up = hit.normal;
            let forward = right.cross(up);

            let xy_angle = PI * self.rng.gen::<Float>();
            let local = Vec3::new(xy_angle.cos(), xy_angle.sin(), 0.0);

            let xz_angle = 2.0 * PI * self.rng.gen::<Float>();
            let rotated = Vec3::new(
                local.x * xz_angle.cos(),
                local.y,
                local.x * xz_angle.sin(),
            );

            let direction = rotated.x * right + rotated.y * up + rotated.z * forward;
            let bounce = Ray::new(
                hit.position + self.options.reflection_bias * hit.normal,
                direction,
            );

            if let Some(bounce_hit) =
                self.accel
                    .closest_hit(&bounce, false, self.options.epsilon, &mut self.stack)
            {
                color += self.shade(&bounce_hit, depth + 1);
            }
        }

        color
    }

    fn shade_refractive(&mut self, hit: &Hit, depth: usize, ior: Float, smooth: bool) -> Color {
        let scene = self.scene;

        let mut n = if smooth { hit.normal } else { hit.face_normal }.normalized();
        let i = hit.ray.direction.normalized();

        let mut eta_i: Float = 1.0;
        let mut eta_r = ior;

        // Leaving the medium: swap the indices and flip the normal.
        if i.dot(n) > 0.0 {
            std::mem::swap(&mut eta_i, &mut eta_r);
            n = -n;
        }

        let reflection_bias = self.options.reflection_bias;
        let refraction_bias = self.options.refraction_bias;

        let trace = |tracer: &mut Self, direction: Vec3, bias: Float| -> Color {
            let ray = Ray::new(hit.position + bias * direction, direction);
            match tracer
                .accel
                .closest_hit(&ray, false, tracer.options.epsilon, &mut tracer.stack)
            {
                Some(next_hit) => tracer.shade(&next_hit, depth + 1),
                None => Color::zero(),
            }
        };

        let reflected = i.reflect(n);

        let Some(refracted) = refract_direction(i, n, eta_i, eta_r) else {
            // Total internal reflection: only the mirror term survives.
            return trace(self, reflected, reflection_bias);
        };

        let refraction_color = trace(self, refracted, refraction_bias);
        let reflection_color = trace(self, reflected, reflection_bias);

        let fresnel = 0.5 * (1.0 + i.dot(n)).powi(5);
        fresnel * reflection_color + (1.0 - fresnel) * refraction_color
    }

    /// Iterative any-hit walk for shadow rays. A non-transmissive surface
    /// within `max_t` occludes; transmissive surfaces are skipped by
    /// advancing the origin past them and shrinking the budget. The walk is
    /// capped at `max_ray_depth` steps so pathological stacks of glass
    /// terminate.
    pub fn is_occluded(&mut self, ray: &Ray, max_t: Float) -> bool {
        let scene = self.scene;
        let mut ray = *ray;
        let mut remaining = max_t;

        for _ in 0..self.options.max_ray_depth {
            if remaining <= 0.0 {
                return false;
            }

            let Some(hit) =
                self.accel
                    .closest_hit(&ray, false, self.options.epsilon, &mut self.stack)
            else {
                return false;
            };
            if remaining < hit.t {
                return false;
            }

            let material = &scene.materials[scene.meshes[hit.mesh_idx].material_idx];
            if !material.is_transmissive() {
                return true;
            }

            ray = Ray::new(
                hit.position + self.options.shadow_bias * ray.direction,
                ray.direction,
            );
            remaining -= hit.t;
        }

        false
    }
}

// ─── Render Driver ──────────────────────────────────────────────────────────

/// Owns the frame loop: builds the tile queue for the chosen schedule, spawns
/// one worker per thread, and joins. Workers pop tiles until the queue is
/// empty, render each tile into a local buffer, and blit the finished tile
/// into the shared image under a mutex — tiles are disjoint, so the lock only
/// serializes the copies.
pub struct Renderer {
    pub accel: Arc<KdTree>,
    pub options: Options,
    pub schedule: Schedule,
    pub threads: usize,
}

impl Renderer {
    pub fn new(accel: Arc<KdTree>, options: Options) -> Self {
        let threads = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self {
            accel,
            options,
            schedule: Schedule::Bucket,
            threads,
        }
    }

    pub fn render(&self) -> (Image, RenderStats) {
        let scene = self.accel.scene();
        let height = scene.settings.image_height;
        let width = scene.settings.image_width;

        let queue = match self.schedule {
            Schedule::Single => single_schedule(height, width),
            Schedule::Region => region_schedule(height, width, self.threads),
            Schedule::Bucket => bucket_schedule(height, width, scene.settings.bucket_size),
        };

        info!(
            schedule = ?self.schedule,
            tiles = queue.len(),
            threads = self.threads,
            "starting render"
        );

        let image = Mutex::new(Image::new(height, width, scene.settings.background_color));
        let progress = Mutex::new(ProgressBar::new(queue.len()));
        let start = Instant::now();

        std::thread::scope(|scope| {
            for _ in 0..self.threads {
                scope.spawn(|| {
                    let mut tracer = Tracer::new(&self.accel, &self.options);
                    while let Some(tile) = queue.pop() {
                        let buf = tracer.render_tile(tile, width, height);

                        let mut img = image.lock().unwrap();
                        let mut i = 0;
                        for y in tile.y0..tile.y1 {
                            for x in tile.x0..tile.x1 {
                                img.set(y, x, buf[i]);
                                i += 1;
                            }
                        }
                        drop(img);

                        progress.lock().unwrap().tick();
                    }
                });
            }
        });

        progress.lock().unwrap().finish();

        let elapsed = start.elapsed().as_secs_f64();
        let stats = RenderStats {
            total_rays: (width * height * self.options.samples_per_pixel) as u64,
            elapsed_secs: elapsed,
            width,
            height,
            samples_per_pixel: self.options.samples_per_pixel,
        };

        (image.into_inner().unwrap(), stats)
    }
}
