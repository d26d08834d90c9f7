//! A single source of posts, kept in descending date order.
//!
//! Posts live in an arena of slots linked into a doubly-linked list (most
//! recent first). The list is indexed by id and by slug and is updated in place
//! as the loader reports new, updated and removed posts.

use crate::options::SelectOptions;
use crate::post::{Post, SlotId};
use crate::select::{Engine, Source};
use crate::types::{
    BlogConfig, BlogEvent, BlogState, Loader, LoaderEvent, MatchFn, NetworkError, PostRef,
    QueryMatcher, RawPost, Result, ValidationError,
};
use crate::utils::normalize_id;
use crate::utils::slugs::{base_slug, unique_slug};
use crate::utils::time::parse_date;
use chrono::{DateTime, Utc};
use interfaces::BaselineQueryMatcher;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A record that passed validation but is not linked into the list yet.
struct Draft {
    id: String,
    title: String,
    slug: Option<String>,
    date: DateTime<Utc>,
    fields: Map<String, Value>,
    matcher: Option<MatchFn>,
}

pub struct Blog {
    config: BlogConfig,
    slots: Vec<Option<Post>>,
    free: Vec<usize>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    by_id: HashMap<String, SlotId>,
    by_slug: HashMap<String, SlotId>,
    state: BlogState,
    matcher: Arc<dyn QueryMatcher>,
    events: Vec<BlogEvent>,
}

impl Blog {
    pub fn new() -> Self {
        Self::with_config(BlogConfig::default())
    }

    pub fn with_config(config: BlogConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            by_id: HashMap::new(),
            by_slug: HashMap::new(),
            state: BlogState::Loading,
            matcher: Arc::new(BaselineQueryMatcher),
            events: Vec::new(),
        }
    }

    /// Build a blog and ingest `records` as its initial batch.
    pub fn from_records(records: Vec<RawPost>) -> Self {
        let mut blog = Self::new();
        // Failures are recorded in the blog's outbox and state.
        let _ = blog.ingest_initial_batch(records);
        blog
    }

    /// Replace the matcher used by standalone `select()` calls.
    pub fn with_matcher(mut self, matcher: Arc<dyn QueryMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn config(&self) -> &BlogConfig {
        &self.config
    }

    pub fn state(&self) -> BlogState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == BlogState::Ready
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Take the signals emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<BlogEvent> {
        std::mem::take(&mut self.events)
    }

    /// Dispatch a single loader notification.
    pub fn handle(&mut self, event: LoaderEvent) {
        // Errors land in the outbox; the return values are for direct callers.
        let _ = match event {
            LoaderEvent::Loaded(records) => self.ingest_initial_batch(records),
            LoaderEvent::Failed(reason) => self.fail_loading(reason),
            LoaderEvent::PostAdded(record) => self.apply_new_post(record),
            LoaderEvent::PostUpdated(record) => self.apply_updated_post(record),
            LoaderEvent::PostRemoved(target) => self.apply_removed_post(target),
        };
    }

    /// Feed every pending event of `loader` into this blog.
    pub fn pump<L: Loader + ?Sized>(&mut self, loader: &mut L) -> usize {
        let mut handled = 0;
        while let Some(event) = loader.next_event() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Validate and ingest the initial batch. Either every record is ingested
    /// and the blog becomes ready, or none is and the blog fails.
    pub fn ingest_initial_batch(&mut self, records: Vec<RawPost>) -> Result<()> {
        if self.state != BlogState::Loading {
            return self.settle(Err(NetworkError::AlreadyLoaded));
        }

        let drafts = match self.validate_batch(records) {
            Ok(drafts) => drafts,
            Err(e) => {
                self.state = BlogState::Failed;
                return self.settle(Err(e.into()));
            }
        };

        let slugs = self.assign_batch_slugs(&drafts);
        let count = drafts.len();
        let mut incoming: Vec<(SlotId, DateTime<Utc>)> = drafts
            .into_iter()
            .zip(slugs)
            .map(|(draft, slug)| {
                let date = draft.date;
                (self.store(draft, slug), date)
            })
            .collect();
        // Stable, so equal dates keep their batch order.
        incoming.sort_by(|a, b| b.1.cmp(&a.1));
        self.merge_batch(incoming);

        self.state = BlogState::Ready;
        self.events.push(BlogEvent::Ready);
        info!("Blog ready with {} posts ({} ingested from initial batch)", self.len(), count);
        Ok(())
    }

    pub fn apply_new_post(&mut self, record: RawPost) -> Result<()> {
        let outcome = self.insert_record(record);
        self.settle(outcome)
    }

    pub fn apply_updated_post(&mut self, record: RawPost) -> Result<()> {
        let outcome = self.update_record(record);
        self.settle(outcome)
    }

    pub fn apply_removed_post(&mut self, target: PostRef) -> Result<()> {
        let outcome = self.remove_record(target);
        self.settle(outcome)
    }

    /// Look a post up by slug.
    pub fn post(&self, slug: &str) -> Option<&Post> {
        self.by_slug.get(slug).and_then(|slot| self.at(*slot))
    }

    /// Look a post up by id.
    pub fn get(&self, id: &str) -> Option<&Post> {
        self.by_id.get(id).and_then(|slot| self.at(*slot))
    }

    pub fn at(&self, slot: SlotId) -> Option<&Post> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    /// The next more recent post.
    pub fn prev(&self, post: &Post) -> Option<&Post> {
        post.prev.and_then(|slot| self.at(slot))
    }

    /// The next older post.
    pub fn next(&self, post: &Post) -> Option<&Post> {
        post.next.and_then(|slot| self.at(slot))
    }

    pub fn first(&self) -> Option<&Post> {
        self.head.and_then(|slot| self.at(slot))
    }

    pub fn last(&self) -> Option<&Post> {
        self.tail.and_then(|slot| self.at(slot))
    }

    pub(crate) fn head(&self) -> Option<SlotId> {
        self.head
    }

    /// Posts in list order, most recent first.
    pub fn posts(&self) -> Posts<'_> {
        Posts {
            blog: self,
            cursor: self.head,
        }
    }

    /// Posts matching `options`, most recent first. A `random` select draws
    /// from every match past the offset and keeps at most `limit`.
    pub fn select(&self, options: &SelectOptions) -> Result<Vec<&Post>> {
        self.select_with_rng(options, &mut rand::thread_rng())
    }

    pub fn select_with_rng<R: Rng>(&self, options: &SelectOptions, rng: &mut R) -> Result<Vec<&Post>> {
        let sources = [Source { name: None, blog: self }];
        let picks = Engine::new(&sources, self.matcher.as_ref()).run(options, rng)?;
        Ok(picks.into_iter().map(|pick| pick.post).collect())
    }

    pub fn count(&self, options: &SelectOptions) -> Result<usize> {
        Ok(self.select(options)?.len())
    }

    fn settle(&mut self, outcome: Result<()>) -> Result<()> {
        if let Err(e) = &outcome {
            warn!("Blog rejected an update: {}", e);
            self.events.push(BlogEvent::Error(e.clone()));
        }
        outcome
    }

    fn fail_loading(&mut self, reason: String) -> Result<()> {
        if self.state == BlogState::Loading {
            self.state = BlogState::Failed;
        }
        self.settle(Err(NetworkError::Loader(reason)))
    }

    fn validate(&self, record: RawPost) -> std::result::Result<Draft, ValidationError> {
        let id = normalize_id(record.id.as_ref().ok_or(ValidationError::MissingId)?)?;
        let raw_date = record
            .date
            .as_ref()
            .filter(|date| !date.is_null())
            .ok_or_else(|| ValidationError::MissingDate { id: id.clone() })?;
        let date = parse_date(raw_date, &self.config.date_formats).ok_or_else(|| {
            ValidationError::InvalidDate {
                id: id.clone(),
                value: raw_date.to_string(),
            }
        })?;
        let title = record
            .title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| self.config.default_title.clone());

        Ok(Draft {
            id,
            title,
            slug: record.slug.filter(|slug| !slug.is_empty()),
            date,
            fields: record.fields,
            matcher: record.matcher,
        })
    }

    fn validate_batch(&self, records: Vec<RawPost>) -> std::result::Result<Vec<Draft>, ValidationError> {
        let mut ids = HashSet::new();
        let mut slugs = HashSet::new();
        let mut drafts = Vec::with_capacity(records.len());
        for record in records {
            let draft = self.validate(record)?;
            if self.by_id.contains_key(&draft.id) || !ids.insert(draft.id.clone()) {
                return Err(ValidationError::DuplicateId { id: draft.id });
            }
            if let Some(slug) = &draft.slug {
                if self.by_slug.contains_key(slug) || !slugs.insert(slug.clone()) {
                    return Err(ValidationError::DuplicateSlug {
                        id: draft.id,
                        slug: slug.clone(),
                    });
                }
            }
            drafts.push(draft);
        }
        Ok(drafts)
    }

    // Supplied slugs are reserved first; the rest are generated oldest first,
    // so the oldest of several "foo" posts keeps the bare `foo`.
    fn assign_batch_slugs(&self, drafts: &[Draft]) -> Vec<String> {
        let mut taken: HashSet<String> = self.by_slug.keys().cloned().collect();
        taken.extend(drafts.iter().filter_map(|draft| draft.slug.clone()));

        let mut slugs: Vec<Option<String>> = drafts.iter().map(|draft| draft.slug.clone()).collect();
        let mut pending: Vec<usize> = (0..drafts.len()).filter(|i| slugs[*i].is_none()).collect();
        pending.sort_by_key(|i| drafts[*i].date);

        for i in pending {
            let base = base_slug(&drafts[i].title, &self.config.default_title);
            let slug = unique_slug(&base, |candidate| taken.contains(candidate));
            taken.insert(slug.clone());
            slugs[i] = Some(slug);
        }

        slugs.into_iter().flatten().collect()
    }

    fn generate_slug(&self, title: &str) -> String {
        let base = base_slug(title, &self.config.default_title);
        unique_slug(&base, |candidate| self.by_slug.contains_key(candidate))
    }

    fn insert_record(&mut self, record: RawPost) -> Result<()> {
        let draft = self.validate(record)?;
        if self.by_id.contains_key(&draft.id) {
            return Err(ValidationError::DuplicateId { id: draft.id }.into());
        }
        if let Some(slug) = &draft.slug {
            if self.by_slug.contains_key(slug) {
                return Err(ValidationError::DuplicateSlug {
                    id: draft.id,
                    slug: slug.clone(),
                }
                .into());
            }
        }

        let slug = match draft.slug.clone() {
            Some(slug) => slug,
            None => self.generate_slug(&draft.title),
        };
        debug!("Adding post {} as {}", draft.id, slug);
        self.link_draft(draft, slug);
        Ok(())
    }

    fn update_record(&mut self, record: RawPost) -> Result<()> {
        let draft = self.validate(record)?;
        let slot = *self
            .by_id
            .get(&draft.id)
            .ok_or_else(|| ValidationError::UnknownPost { id: draft.id.clone() })?;
        if let Some(slug) = &draft.slug {
            if self.by_slug.get(slug).is_some_and(|owner| *owner != slot) {
                return Err(ValidationError::DuplicateSlug {
                    id: draft.id,
                    slug: slug.clone(),
                }
                .into());
            }
        }

        let Some(current) = self.at(slot) else {
            return Err(ValidationError::UnknownPost { id: draft.id }.into());
        };
        let old_slug = current.slug().to_string();
        let title_changed = current.title() != draft.title;
        let date_changed = current.date() != draft.date;

        // Free the old slug first so a retitled post may regenerate it.
        self.by_slug.remove(&old_slug);
        let slug = match draft.slug {
            Some(slug) => slug,
            None if title_changed => self.generate_slug(&draft.title),
            None => old_slug,
        };
        self.by_slug.insert(slug.clone(), slot);

        if let Some(post) = self.slots[slot.0].as_mut() {
            post.set_content(draft.title, slug, draft.date, draft.fields, draft.matcher);
        }
        if date_changed {
            self.detach(slot);
            self.attach(slot);
        }
        debug!("Updated post {}", draft.id);
        Ok(())
    }

    fn remove_record(&mut self, target: PostRef) -> Result<()> {
        let id = normalize_id(target.id().ok_or(ValidationError::MissingId)?)?;
        let slot = self
            .by_id
            .remove(&id)
            .ok_or(ValidationError::UnknownPost { id: id.clone() })?;
        self.detach(slot);
        if let Some(post) = self.slots[slot.0].take() {
            self.by_slug.remove(post.slug());
        }
        self.free.push(slot.0);
        debug!("Removed post {}", id);
        Ok(())
    }

    fn link_draft(&mut self, draft: Draft, slug: String) {
        let slot = self.store(draft, slug);
        self.attach(slot);
    }

    /// Put a draft into a slot and index it, without linking it.
    fn store(&mut self, draft: Draft, slug: String) -> SlotId {
        let post = Post::new(draft.id, draft.title, slug, draft.date, draft.fields, draft.matcher);
        let id = post.id().to_string();
        let slug = post.slug().to_string();
        let slot = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(post);
                SlotId(index)
            }
            None => {
                self.slots.push(Some(post));
                SlotId(self.slots.len() - 1)
            }
        };
        self.by_id.insert(id, slot);
        self.by_slug.insert(slug, slot);
        slot
    }

    /// Merge unlinked slots, already sorted most recent first, into the list
    /// in one pass. Posts already linked stay ahead of incoming ones with the
    /// same date.
    fn merge_batch(&mut self, incoming: Vec<(SlotId, DateTime<Utc>)>) {
        let mut merged = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        for (slot, date) in incoming {
            while let Some(current) = cursor {
                let Some(post) = self.at(current) else { break };
                if post.date() < date {
                    break;
                }
                merged.push(current);
                cursor = post.next;
            }
            merged.push(slot);
        }
        while let Some(current) = cursor {
            merged.push(current);
            cursor = self.at(current).and_then(|post| post.next);
        }

        for (index, &slot) in merged.iter().enumerate() {
            let prev = index.checked_sub(1).map(|i| merged[i]);
            let next = merged.get(index + 1).copied();
            self.set_links(slot, prev, next);
        }
        self.head = merged.first().copied();
        self.tail = merged.last().copied();
    }

    /// Splice an unlinked slot into the list: before the first strictly older
    /// post, i.e. after every post with the same or a later date.
    fn attach(&mut self, slot: SlotId) {
        let Some(date) = self.at(slot).map(Post::date) else {
            return;
        };

        let mut before = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let Some(post) = self.at(current) else { break };
            if post.date() < date {
                before = Some(current);
                break;
            }
            cursor = post.next;
        }

        let prev = match before {
            Some(before) => self.at(before).and_then(|post| post.prev),
            None => self.tail,
        };
        self.set_links(slot, prev, before);
        match prev {
            Some(prev) => self.set_next(prev, Some(slot)),
            None => self.head = Some(slot),
        }
        match before {
            Some(before) => self.set_prev(before, Some(slot)),
            None => self.tail = Some(slot),
        }
    }

    /// Unlink a slot, joining its former neighbours to each other.
    fn detach(&mut self, slot: SlotId) {
        let Some((prev, next)) = self.at(slot).map(|post| (post.prev, post.next)) else {
            return;
        };
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.head = next,
        }
        match next {
            Some(next) => self.set_prev(next, prev),
            None => self.tail = prev,
        }
        self.set_links(slot, None, None);
    }

    fn set_links(&mut self, slot: SlotId, prev: Option<SlotId>, next: Option<SlotId>) {
        if let Some(post) = self.slots[slot.0].as_mut() {
            post.prev = prev;
            post.next = next;
        }
    }

    fn set_prev(&mut self, slot: SlotId, prev: Option<SlotId>) {
        if let Some(post) = self.slots[slot.0].as_mut() {
            post.prev = prev;
        }
    }

    fn set_next(&mut self, slot: SlotId, next: Option<SlotId>) {
        if let Some(post) = self.slots[slot.0].as_mut() {
            post.next = next;
        }
    }
}

impl Default for Blog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Blog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blog")
            .field("state", &self.state)
            .field("posts", &self.posts().collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over a blog's posts, most recent first.
pub struct Posts<'a> {
    blog: &'a Blog,
    cursor: Option<SlotId>,
}

impl<'a> Iterator for Posts<'a> {
    type Item = &'a Post;

    fn next(&mut self) -> Option<Self::Item> {
        let post = self.blog.at(self.cursor?)?;
        self.cursor = post.next;
        Some(post)
    }
}
