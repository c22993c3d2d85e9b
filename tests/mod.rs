use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

use rand::{prelude::Distribution, rngs::SmallRng, Rng, SeedableRng};
use statrs::distribution::{Erlang, Exp};

use partitioned_limiter::{
    limits::{Aimd, LimitAlgorithm, Windowed},
    Outcome, Partition, PartitionedLimiter, RequestContext, StringMatcher, Token,
};
use tokio::time::Instant;

const CLASSES: [&str; 2] = ["batch", "live"];

struct Client {
    class: usize,
    /// Poisson process, exponential interarrival times.
    interarrival: Exp,
}

struct Server<L> {
    limiter: PartitionedLimiter<L>,

    latency: Erlang,

    /// Range: [0, 1)
    failure_rate: f64,
}

#[derive(Debug)]
struct Event {
    time: Instant,
    typ: EventType,
}

#[derive(Debug)]
enum EventType {
    StartRequest { class: usize },
    EndRequest { token: Token },
}

#[derive(Debug, Default)]
struct Results {
    admitted: [usize; 2],
    rejected: [usize; 2],
    overloaded: usize,
    min_limit: usize,
    max_limit: usize,
}

impl Client {
    /// Create a client which sends `rps` requests per second on average.
    fn new(class: usize, rps: f64) -> Self {
        Self {
            class,
            interarrival: Exp::new(rps).unwrap(),
        }
    }

    fn next_arrival_in(&self, rng: &mut SmallRng) -> Duration {
        let dt = self.interarrival.sample(rng);
        Duration::from_secs_f64(dt)
    }
}

impl<L> Server<L>
where
    L: LimitAlgorithm,
{
    /// Create a server with a concurrency limiter, a latency distribution and a failure rate.
    ///
    /// The latency is calculated according to the number of tasks needed to be performed and the
    /// average rate of completion of these tasks (per second).
    fn new(limiter: PartitionedLimiter<L>, tasks: u64, task_rate: f64, failure_rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&failure_rate));
        Self {
            limiter,
            latency: Erlang::new(tasks, task_rate).unwrap(),
            failure_rate,
        }
    }

    fn start(&self, class: usize, rng: &mut SmallRng) -> Option<(Token, Duration)> {
        let ctx = RequestContext::with_classification(CLASSES[class]);
        self.limiter
            .try_acquire(&ctx)
            .map(|token| (token, Duration::from_secs_f64(self.latency.sample(rng))))
    }

    fn end(&self, token: Token, rng: &mut SmallRng) -> Outcome {
        let outcome = if rng.gen_range(0.0..1.0) >= self.failure_rate {
            Outcome::Success
        } else {
            Outcome::Overload
        };

        self.limiter.release(token, Some(outcome));

        outcome
    }

    fn assert_busy_conserved(&self) {
        let strategy = self.limiter.strategy();
        let sum: usize = (0..strategy.len())
            .map(|i| strategy.bin_busy_count(i).unwrap())
            .sum();
        assert_eq!(strategy.busy_count(), sum);
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time.eq(&other.time)
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time.cmp(&other.time)
    }
}

/// Precondition: time has been paused.
async fn simulate<L: LimitAlgorithm>(
    server: &Server<L>,
    clients: &[Client],
    max_time: Duration,
    seed: u64,
) -> Results {
    let start = Instant::now();
    let mut rng = SmallRng::seed_from_u64(seed);

    // Priority queue of events (min heap).
    let mut queue = BinaryHeap::new();
    for client in clients {
        queue.push(Reverse(Event {
            time: start + client.next_arrival_in(&mut rng),
            typ: EventType::StartRequest {
                class: client.class,
            },
        }));
    }

    let mut results = Results {
        min_limit: usize::MAX,
        ..Default::default()
    };

    while let Some(Reverse(event)) = queue.pop() {
        tokio::time::advance(event.time.saturating_duration_since(Instant::now())).await;
        let current_time = Instant::now();

        match event.typ {
            EventType::StartRequest { class } => {
                match server.start(class, &mut rng) {
                    Some((token, latency)) => {
                        results.admitted[class] += 1;
                        queue.push(Reverse(Event {
                            time: current_time + latency,
                            typ: EventType::EndRequest { token },
                        }));
                    }
                    None => results.rejected[class] += 1,
                }

                if current_time.duration_since(start) < max_time {
                    queue.push(Reverse(Event {
                        time: current_time + clients[class].next_arrival_in(&mut rng),
                        typ: EventType::StartRequest { class },
                    }));
                }
            }

            EventType::EndRequest { token } => {
                if server.end(token, &mut rng) == Outcome::Overload {
                    results.overloaded += 1;
                }
            }
        }

        server.assert_busy_conserved();

        let limit = server.limiter.limit();
        results.min_limit = results.min_limit.min(limit);
        results.max_limit = results.max_limit.max(limit);
    }

    results
}

fn partitions() -> Vec<Partition> {
    CLASSES
        .iter()
        .zip([0.3, 0.7])
        .map(|(class, percent)| {
            Partition::new(*class, percent).with_matcher(StringMatcher::new(*class))
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn both_partitions_are_served_under_load() {
    let limiter = PartitionedLimiter::new(
        Windowed::new(Aimd::new_with_initial_limit(10).with_max_limit(50))
            .with_min_samples(5)
            .with_min_window(Duration::from_millis(50)),
        partitions(),
    )
    .unwrap();

    // ~200ms average latency.
    let server = Server::new(limiter, 2, 10.0, 0.05);

    // Batch traffic far exceeds capacity, live traffic is modest.
    let clients = [Client::new(0, 200.0), Client::new(1, 20.0)];

    let results = simulate(&server, &clients, Duration::from_secs(10), 42).await;
    println!("{results:#?}");

    assert!(results.admitted[0] > 0, "batch should be served");
    assert!(results.admitted[1] > 0, "live should be served");
    assert!(results.rejected[0] > 0, "batch should be limited");
    assert!(results.overloaded > 0, "some jobs should fail");
    assert!(results.min_limit >= 1);
    assert!(results.max_limit <= 50);

    assert_eq!(
        server.limiter.strategy().busy_count(),
        0,
        "all tokens should be released"
    );
}
