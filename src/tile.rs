use std::collections::VecDeque;
use std::sync::Mutex;

/// A half-open rectangle of output pixels: `[x0, x1) × [y0, y1)`. The unit
/// of parallel work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

/// FIFO of tiles guarded by a single mutex. Tiles are produced before the
/// workers start and destructively popped; `pop` returning `None` is the
/// workers' termination signal.
#[derive(Debug, Default)]
pub struct TileQueue {
    queue: Mutex<VecDeque<Tile>>,
}

impl TileQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, tile: Tile) {
        self.queue.lock().unwrap().push_back(tile);
    }

    pub fn pop(&self) -> Option<Tile> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One tile covering the whole image.
pub fn single_schedule(height: usize, width: usize) -> TileQueue {
    let queue = TileQueue::new();
    queue.push(Tile {
        x0: 0,
        y0: 0,
        x1: width,
        y1: height,
    });
    queue
}

/// A ⌈√N⌉ × ⌈√N⌉ grid sized so each of `num_threads` workers gets roughly
/// one region; edge tiles are clipped to the image.
pub fn region_schedule(height: usize, width: usize, num_threads: usize) -> TileQueue {
    let side = ((num_threads as f64).sqrt().ceil() as usize).max(1);
    let tile_width = width.div_ceil(side);
    let tile_height = height.div_ceil(side);

    let queue = TileQueue::new();
    for ty in 0..side {
        for tx in 0..side {
            let x0 = tx * tile_width;
            let y0 = ty * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);
            if x0 < x1 && y0 < y1 {
                queue.push(Tile { x0, y0, x1, y1 });
            }
        }
    }
    queue
}

/// Fixed square tiles of side `bucket_size`, clipped at the right and bottom
/// edges.
pub fn bucket_schedule(height: usize, width: usize, bucket_size: usize) -> TileQueue {
    let queue = TileQueue::new();
    let mut ty = 0;
    while ty < height {
        let mut tx = 0;
        while tx < width {
            queue.push(Tile {
                x0: tx,
                y0: ty,
                x1: (tx + bucket_size).min(width),
                y1: (ty + bucket_size).min(height),
            });
            tx += bucket_size;
        }
        ty += bucket_size;
    }
    queue
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drains the queue and asserts the tiles exactly cover `[0,w) × [0,h)`
    /// with no overlap.
    fn assert_exact_cover(queue: &TileQueue, height: usize, width: usize) {
        let mut covered = vec![0u32; height * width];
        while let Some(tile) = queue.pop() {
            assert!(tile.x0 < tile.x1 && tile.y0 < tile.y1, "degenerate {tile:?}");
            assert!(tile.x1 <= width && tile.y1 <= height, "out of bounds {tile:?}");
            for y in tile.y0..tile.y1 {
                for x in tile.x0..tile.x1 {
                    covered[y * width + x] += 1;
                }
            }
        }
        assert!(
            covered.iter().all(|&c| c == 1),
            "coverage is not exactly once"
        );
    }

    #[test]
    fn single_schedule_covers_image() {
        let queue = single_schedule(7, 11);
        assert_eq!(queue.len(), 1);
        assert_exact_cover(&queue, 7, 11);
    }

    #[test]
    fn region_schedule_covers_image() {
        for threads in [1, 2, 3, 4, 7, 16] {
            let queue = region_schedule(33, 57, threads);
            assert_exact_cover(&queue, 33, 57);
        }
    }

    #[test]
    fn bucket_schedule_covers_image_with_clipping() {
        // 50 is not a multiple of 16: right/bottom tiles are clipped.
        let queue = bucket_schedule(50, 50, 16);
        assert_exact_cover(&queue, 50, 50);
    }

    #[test]
    fn bucket_schedule_tile_shape() {
        let queue = bucket_schedule(10, 10, 4);
        let first = queue.pop().unwrap();
        assert_eq!(
            first,
            Tile {
                x0: 0,
                y0: 0,
                x1: 4,
                y1: 4
            }
        );
        // 3 columns × 3 rows, minus the one already popped.
        assert_eq!(queue.len(), 8);
    }

    #[test]
    fn pop_is_fifo_until_empty() {
        let queue = TileQueue::new();
        let a = Tile {
            x0: 0,
            y0: 0,
            x1: 1,
            y1: 1,
        };
        let b = Tile {
            x0: 1,
            y0: 0,
            x1: 2,
            y1: 1,
        };
        queue.push(a);
        queue.push(b);
        assert_eq!(queue.pop(), Some(a));
        assert_eq!(queue.pop(), Some(b));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }
}
