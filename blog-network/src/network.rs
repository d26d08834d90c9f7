use crate::blog::Blog;
use crate::options::SelectOptions;
use crate::post::Post;
use crate::select::{Engine, Source};
use crate::types::{
    BlogConfig, BlogEvent, Loader, LoaderEvent, NetworkError, NetworkEvent, QueryMatcher, Result,
};
use interfaces::BaselineQueryMatcher;
use rand::Rng;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

struct Member {
    blog: Blog,
    /// Whether this member's first Ready has been counted.
    counted: bool,
}

/// Keys a `Selected` writes itself; payload fields with these names are
/// left out of its serialized form.
const RESERVED_KEYS: [&str; 5] = ["blog", "id", "title", "slug", "date"];

/// A post selected from a network, tagged with the blog it came from.
///
/// Serializes as one flat object. The blog name and the post's core fields
/// win over payload fields of the same name.
#[derive(Debug, Clone, Copy)]
pub struct Selected<'a> {
    pub blog: &'a str,
    pub post: &'a Post,
}

impl Serialize for Selected<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("blog", self.blog)?;
        map.serialize_entry("id", self.post.id())?;
        map.serialize_entry("title", self.post.title())?;
        map.serialize_entry("slug", self.post.slug())?;
        map.serialize_entry("date", &self.post.date())?;
        for (key, value) in self.post.fields() {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl<'a> Selected<'a> {
    /// The `blog:id` key that `not` accepts to exclude this post.
    pub fn key(&self) -> String {
        format!("{}:{}", self.blog, self.post.id())
    }
}

/// Aggregates named blogs into one selectable stream.
pub struct Network {
    config: BlogConfig,
    blogs: HashMap<String, Member>,
    names: Vec<String>,
    pending: usize,
    ready: bool,
    matcher: Arc<dyn QueryMatcher>,
    events: Vec<NetworkEvent>,
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(BlogConfig::default())
    }

    pub fn with_config(config: BlogConfig) -> Self {
        Self {
            config,
            blogs: HashMap::new(),
            names: Vec::new(),
            pending: 0,
            ready: false,
            matcher: Arc::new(BaselineQueryMatcher),
            events: Vec::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn QueryMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Build a network from several blogs at once. Every member is registered
    /// before any signal is looked at, so readiness waits for all of them.
    pub fn from_blogs<I, S>(blogs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Blog)>,
        S: Into<String>,
    {
        let mut network = Self::new();
        for (name, blog) in blogs {
            network.insert(name.into(), blog)?;
        }
        for name in network.names.clone() {
            network.sync(&name);
        }
        Ok(network)
    }

    /// Register `blog` under `name`. Signals the blog already emitted are
    /// picked up immediately; a blog that is already ready counts at once.
    pub fn add(&mut self, name: impl Into<String>, blog: Blog) -> Result<()> {
        let name = name.into();
        self.insert(name.clone(), blog)?;
        self.sync(&name);
        Ok(())
    }

    /// Register an empty blog built from the network's `BlogConfig`; feed it
    /// with [`Network::deliver`] or [`Network::pump`].
    pub fn register(&mut self, name: impl Into<String>) -> Result<()> {
        let blog = Blog::with_config(self.config.clone());
        self.add(name, blog)
    }

    /// Route a loader event to the blog registered as `name`.
    pub fn deliver(&mut self, name: &str, event: LoaderEvent) -> Result<()> {
        let member = self
            .blogs
            .get_mut(name)
            .ok_or_else(|| NetworkError::UnknownBlog { name: name.to_string() })?;
        member.blog.handle(event);
        self.sync(name);
        Ok(())
    }

    /// Feed every pending event of `loader` to the blog registered as `name`.
    pub fn pump<L: Loader + ?Sized>(&mut self, name: &str, loader: &mut L) -> Result<usize> {
        let mut handled = 0;
        while let Some(event) = loader.next_event() {
            self.deliver(name, event)?;
            handled += 1;
        }
        Ok(handled)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn drain_events(&mut self) -> Vec<NetworkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn blog(&self, name: &str) -> Option<&Blog> {
        self.blogs.get(name).map(|member| &member.blog)
    }

    /// Blog names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Blog)> {
        self.names
            .iter()
            .filter_map(|name| self.blogs.get(name).map(|member| (name.as_str(), &member.blog)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Merge the member blogs most recent first, honouring `options`.
    ///
    /// With `random` set, the draw covers every match past the offset, not
    /// just the `limit` most recent ones; `limit` only caps how many are kept.
    pub fn select(&self, options: &SelectOptions) -> Result<Vec<Selected<'_>>> {
        self.select_with_rng(options, &mut rand::thread_rng())
    }

    pub fn select_with_rng<R: Rng>(&self, options: &SelectOptions, rng: &mut R) -> Result<Vec<Selected<'_>>> {
        let sources: Vec<Source<'_>> = self
            .iter()
            .map(|(name, blog)| Source { name: Some(name), blog })
            .collect();
        let picks = Engine::new(&sources, self.matcher.as_ref()).run(options, rng)?;
        Ok(picks
            .into_iter()
            .map(|pick| Selected {
                blog: sources[pick.source].name.unwrap_or_default(),
                post: pick.post,
            })
            .collect())
    }

    /// Select while cycling fairly between blogs.
    pub fn select_distinct(&self, options: &SelectOptions) -> Result<Vec<Selected<'_>>> {
        self.select(&options.clone().distinct(true))
    }

    pub fn count(&self, options: &SelectOptions) -> Result<usize> {
        Ok(self.select(options)?.len())
    }

    fn insert(&mut self, name: String, blog: Blog) -> Result<()> {
        if self.blogs.contains_key(&name) {
            return Err(NetworkError::DuplicateBlog { name });
        }
        info!("Adding blog {} to network ({} posts, {:?})", name, blog.len(), blog.state());
        self.pending += 1;
        self.names.push(name.clone());
        self.blogs.insert(name, Member { blog, counted: false });
        Ok(())
    }

    /// Fan a member's signals into the network's own.
    fn sync(&mut self, name: &str) {
        let Some(member) = self.blogs.get_mut(name) else {
            return;
        };

        for event in member.blog.drain_events() {
            match event {
                BlogEvent::Ready => {}
                BlogEvent::Error(error) => {
                    error!("Blog {} reported an error: {}", name, error);
                    self.events.push(NetworkEvent::Error {
                        blog: name.to_string(),
                        error,
                    });
                }
            }
        }

        if member.counted || !member.blog.is_ready() {
            return;
        }
        member.counted = true;
        self.pending = self.pending.saturating_sub(1);
        debug!("Blog {} is ready, {} still loading", name, self.pending);

        if self.pending == 0 && !self.ready {
            self.ready = true;
            self.events.push(NetworkEvent::Ready);
            info!("Network ready with {} blogs", self.names.len());
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("names", &self.names)
            .field("pending", &self.pending)
            .field("ready", &self.ready)
            .finish()
    }
}
