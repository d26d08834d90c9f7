//! Selection over one or more date-ordered sources.
//!
//! A blog selects from itself as a single unnamed source; a network hands
//! every member in as a named source, in registration order.

use crate::blog::Blog;
use crate::options::{Exclusions, SelectOptions, Window};
use crate::post::{Post, SlotId};
use crate::types::{NetworkError, Query, QueryMatcher, Result, Verdict};
use rand::Rng;
use std::collections::HashSet;
use tracing::debug;

pub(crate) struct Source<'a> {
    /// `None` when selecting from a lone blog; exclusion keys are then bare ids.
    pub name: Option<&'a str>,
    pub blog: &'a Blog,
}

pub(crate) struct Pick<'a> {
    pub source: usize,
    pub slot: SlotId,
    pub post: &'a Post,
}

/// Result of one merge walk. `stopped` is set when a predicate asked to stop.
struct Walk<'a> {
    picks: Vec<Pick<'a>>,
    stopped: bool,
}

/// Exclusions resolved against the sources of one select call.
struct Filter {
    blocked_sources: Vec<bool>,
    blocked_ids: Vec<HashSet<String>>,
    picked: HashSet<(usize, SlotId)>,
    round: HashSet<usize>,
}

impl Filter {
    fn new(sources: &[Source<'_>], exclusions: &Exclusions) -> Self {
        let mut blocked_sources = vec![false; sources.len()];
        let mut blocked_ids = vec![HashSet::new(); sources.len()];

        for key in exclusions.iter() {
            for (index, source) in sources.iter().enumerate() {
                match source.name {
                    Some(name) if key == name => blocked_sources[index] = true,
                    Some(name) => {
                        if let Some(id) = key.strip_prefix(name).and_then(|rest| rest.strip_prefix(':')) {
                            blocked_ids[index].insert(id.to_string());
                        }
                    }
                    None => {
                        blocked_ids[index].insert(key.to_string());
                    }
                }
            }
        }

        Self {
            blocked_sources,
            blocked_ids,
            picked: HashSet::new(),
            round: HashSet::new(),
        }
    }

    fn allows(&self, source: usize, slot: SlotId, post: &Post) -> bool {
        !self.blocked_sources[source]
            && !self.round.contains(&source)
            && !self.picked.contains(&(source, slot))
            && !self.blocked_ids[source].contains(post.id())
    }
}

pub(crate) struct Engine<'s, 'a> {
    sources: &'s [Source<'a>],
    matcher: &'s dyn QueryMatcher,
}

impl<'s, 'a> Engine<'s, 'a> {
    pub fn new(sources: &'s [Source<'a>], matcher: &'s dyn QueryMatcher) -> Self {
        Self { sources, matcher }
    }

    /// Run a full select: merge (or distinct cycling), then shuffle and pad
    /// as requested.
    pub fn run<R: Rng>(&self, options: &SelectOptions, rng: &mut R) -> Result<Vec<Pick<'a>>> {
        let Some(window) = options.window() else {
            debug!("Select window is negative, returning nothing");
            return Ok(Vec::new());
        };

        let mut filter = Filter::new(self.sources, &options.not);
        let query = options.query.as_ref();

        // Random selection draws from every match past the offset.
        let walk_window = if options.random {
            Window { limit: None, ..window }
        } else {
            window
        };
        let walk = if options.distinct {
            self.distinct(query, &mut filter, walk_window)?
        } else {
            self.merge(query, &filter, walk_window)?
        };
        let stopped = walk.stopped;
        let mut picks = walk.picks;

        if options.random {
            picks = shuffle_take(picks, window.limit, rng);
        }

        let mut padded = 0;
        if options.fill {
            if let Some(limit) = window.limit.filter(|limit| picks.len() < *limit) {
                let shortfall = limit - picks.len();
                filter.round.clear();
                filter.picked = picks.iter().map(|pick| (pick.source, pick.slot)).collect();

                let pad = self.merge(None, &filter, Window::unbounded())?;
                let pad = shuffle_take(pad.picks, Some(shortfall), rng);
                padded = pad.len();
                picks.extend(pad);
            }
        }

        debug!(
            "Selected {} posts from {} sources (padded: {}, stopped early: {})",
            picks.len(),
            self.sources.len(),
            padded,
            stopped
        );
        Ok(picks)
    }

    /// k-way merge over the sources' lists, most recent first.
    fn merge(&self, query: Option<&Query>, filter: &Filter, window: Window) -> Result<Walk<'a>> {
        let mut cursors: Vec<Option<SlotId>> = self.sources.iter().map(|source| source.blog.head()).collect();
        let mut offset = window.offset;
        let mut picks = Vec::new();

        while !window.is_full(picks.len()) {
            let Some((source, slot, post)) = self.advance(&mut cursors) else {
                break;
            };
            if !filter.allows(source, slot, post) {
                continue;
            }
            match self.test(query, post)? {
                Verdict::Match => {}
                Verdict::NoMatch => continue,
                Verdict::Stop => return Ok(Walk { picks, stopped: true }),
            }
            if offset > 0 {
                offset -= 1;
                continue;
            }
            picks.push(Pick { source, slot, post });
        }

        Ok(Walk { picks, stopped: false })
    }

    /// Fair cycling: at most one post per source per round, newest first.
    fn distinct(&self, query: Option<&Query>, filter: &mut Filter, window: Window) -> Result<Walk<'a>> {
        let mut offset = window.offset;
        let mut picks = Vec::new();

        while !window.is_full(picks.len()) {
            let walk = self.merge(query, filter, Window::single())?;
            let Some(pick) = walk.picks.into_iter().next() else {
                if walk.stopped || filter.round.is_empty() {
                    return Ok(Walk { picks, stopped: walk.stopped });
                }
                filter.round.clear();
                continue;
            };

            filter.picked.insert((pick.source, pick.slot));
            filter.round.insert(pick.source);
            if offset > 0 {
                offset -= 1;
            } else {
                picks.push(pick);
            }
        }

        Ok(Walk { picks, stopped: false })
    }

    /// Take the most recent post among the cursors and move that cursor on.
    /// Equal dates go to the earliest source.
    fn advance(&self, cursors: &mut [Option<SlotId>]) -> Option<(usize, SlotId, &'a Post)> {
        let mut best: Option<(usize, SlotId, &'a Post)> = None;
        for (index, cursor) in cursors.iter().enumerate() {
            let Some(slot) = *cursor else { continue };
            let Some(post) = self.sources[index].blog.at(slot) else {
                continue;
            };
            if best.map_or(true, |(_, _, current)| post.date() > current.date()) {
                best = Some((index, slot, post));
            }
        }

        let (index, _, post) = best?;
        cursors[index] = post.next_slot();
        best
    }

    fn test(&self, query: Option<&Query>, post: &Post) -> Result<Verdict> {
        match query {
            None => Ok(Verdict::Match),
            Some(query) => post.matches(query, self.matcher).map_err(NetworkError::from),
        }
    }
}

/// Random permutation of up to `limit` of `items`.
fn shuffle_take<T, R: Rng>(mut items: Vec<T>, limit: Option<usize>, rng: &mut R) -> Vec<T> {
    let take = limit.map_or(items.len(), |limit| limit.min(items.len()));
    let mut shuffled = Vec::with_capacity(take);
    while shuffled.len() < take {
        let index = rng.gen_range(0..items.len());
        shuffled.push(items.swap_remove(index));
    }
    shuffled
}
