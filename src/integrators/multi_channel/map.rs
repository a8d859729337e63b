//! Channel maps and the allocation of calls to channels.
use crate::core::error::Error;
use num_traits::Float;

/// A set of channels, each mapping random numbers from the unit hypercube onto the integration
/// domain with its own density.
pub trait ChannelMap<T>: Send + Sync {
    /// The number of channels.
    fn channels(&self) -> usize;

    /// The number of random numbers every channel needs to generate a point.
    fn dim(&self) -> usize;

    /// The number of coordinates of a generated point.
    fn map_dim(&self) -> usize;

    /// Generates the point `coordinates` from the `random` numbers with `channel` and returns the
    /// Jacobian of the map, i.e. the inverse of the density of `channel` at `coordinates`.
    fn map(&self, channel: usize, random: &[T], coordinates: &mut [T]) -> T;

    /// Returns the density with which `channel` generates the point `coordinates`.
    fn density(&self, channel: usize, coordinates: &[T]) -> T;
}

/// A single channel of a [`ChannelMapSet`].
pub trait Channel<T>: Send + Sync {
    /// Generates the point `coordinates` from the `random` numbers and returns the Jacobian.
    fn map(&self, random: &[T], coordinates: &mut [T]) -> T;

    /// Returns the density with which this channel generates `coordinates`.
    fn density(&self, coordinates: &[T]) -> T;
}

/// A channel given by a pair of closures.
pub struct FnChannel<M, D> {
    map: M,
    density: D,
}

impl<T, M, D> Channel<T> for FnChannel<M, D>
where
    M: Fn(&[T], &mut [T]) -> T + Send + Sync,
    D: Fn(&[T]) -> T + Send + Sync,
{
    fn map(&self, random: &[T], coordinates: &mut [T]) -> T {
        (self.map)(random, coordinates)
    }

    fn density(&self, coordinates: &[T]) -> T {
        (self.density)(coordinates)
    }
}

/// Creates a channel from a closure mapping random numbers onto coordinates, which returns the
/// Jacobian, and a closure computing the density at given coordinates.
pub fn make_channel<T, M, D>(map: M, density: D) -> FnChannel<M, D>
where
    M: Fn(&[T], &mut [T]) -> T + Send + Sync,
    D: Fn(&[T]) -> T + Send + Sync,
{
    FnChannel { map, density }
}

/// An ordered collection of channels sharing the same dimensions.
pub struct ChannelMapSet<T> {
    dim: usize,
    map_dim: usize,
    channels: Vec<Box<dyn Channel<T>>>,
}

impl<T> ChannelMapSet<T> {
    /// Constructor for an empty set of channels using `dim` random numbers to generate points
    /// with `map_dim` coordinates.
    pub fn new(dim: usize, map_dim: usize) -> Self {
        Self {
            dim,
            map_dim,
            channels: Vec::new(),
        }
    }

    /// Appends `channel` to the set.
    pub fn push(&mut self, channel: impl Channel<T> + 'static) {
        self.channels.push(Box::new(channel));
    }

    /// Appends `channel` to the set and returns the set.
    pub fn with_channel(mut self, channel: impl Channel<T> + 'static) -> Self {
        self.push(channel);
        self
    }
}

impl<T> ChannelMap<T> for ChannelMapSet<T> {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn map_dim(&self) -> usize {
        self.map_dim
    }

    fn map(&self, channel: usize, random: &[T], coordinates: &mut [T]) -> T {
        self.channels[channel].map(random, coordinates)
    }

    fn density(&self, channel: usize, coordinates: &[T]) -> T {
        self.channels[channel].density(coordinates)
    }
}

/// The smallest number of calls channels with `weights` can be run with. Channels with a
/// positive weight need at least one call to be estimated at all.
pub fn required_calls<T: Float>(weights: &[T], min_calls: usize) -> usize {
    weights
        .iter()
        .map(|&w| {
            if w > T::zero() {
                min_calls.max(1)
            } else {
                min_calls
            }
        })
        .sum()
}

/// Splits `calls` among channels proportionally to `weights`. Every channel receives at least
/// `min_calls` calls, every channel with a positive weight at least one; the remaining calls are
/// split among the channels whose proportional share exceeds their minimum. Shares are rounded
/// by the largest remainder so that the returned counts sum to `calls` exactly.
pub fn allocate_calls<T: Float>(
    weights: &[T],
    calls: usize,
    min_calls: usize,
) -> Result<Vec<usize>, Error> {
    let channels = weights.len();

    if channels == 0 {
        return Err(Error::InvalidConfig("there are no channels".to_string()));
    }

    let required = required_calls(weights, min_calls);

    if calls < required {
        return Err(Error::TooFewCalls { calls, required });
    }

    let floors: Vec<_> = weights
        .iter()
        .map(|&w| required_calls(&[w], min_calls))
        .collect();
    let weights: Vec<f64> = weights
        .iter()
        .map(|w| w.to_f64().unwrap_or(0.0))
        .collect();

    // channels whose proportional share is below their floor
    let mut pinned = vec![false; channels];

    let (shares, free_calls) = loop {
        let free_calls = calls
            - (0..channels)
                .filter(|&i| pinned[i])
                .map(|i| floors[i])
                .sum::<usize>();
        let free_weight: f64 = (0..channels)
            .filter(|&i| !pinned[i])
            .map(|i| weights[i])
            .sum();

        let shares: Vec<f64> = (0..channels)
            .map(|i| {
                if pinned[i] || free_weight <= 0.0 {
                    0.0
                } else {
                    weights[i] / free_weight * free_calls as f64
                }
            })
            .collect();

        let mut changed = false;

        for i in 0..channels {
            if !pinned[i] && shares[i] < floors[i] as f64 {
                pinned[i] = true;
                changed = true;
            }
        }

        if !changed {
            break (shares, free_calls);
        }
    };

    let mut counts: Vec<usize> = (0..channels)
        .map(|i| {
            if pinned[i] {
                floors[i]
            } else {
                (shares[i].floor() as usize).max(floors[i])
            }
        })
        .collect();

    let assigned = counts
        .iter()
        .enumerate()
        .filter(|&(i, _)| !pinned[i])
        .map(|(_, &c)| c)
        .sum::<usize>();

    // hand out the remaining calls by the largest remainder, ties by index; without free
    // channels the remainder goes round-robin to all channels
    let mut order: Vec<usize> = (0..channels).filter(|&i| !pinned[i]).collect();

    if order.is_empty() {
        order = (0..channels).collect();
    } else {
        order.sort_by(|&a, &b| {
            let ra = shares[a] - shares[a].floor();
            let rb = shares[b] - shares[b].floor();
            rb.partial_cmp(&ra)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
    }

    let remaining = free_calls.saturating_sub(assigned);

    for k in 0..remaining {
        counts[order[k % order.len()]] += 1;
    }

    Ok(counts)
}
