//! Self-link rewriting
//!
//! Downstream functions answer with links into their own address space.
//! Consumers must only ever see the gateway, so every self-link and
//! `Location` is re-rooted under the gateway's advertised address.

use crate::config::EndpointConfig;
use crate::model::{PfdData, PfdManagement, TrafficInfluSub};
use crate::{Error, Result};

/// Resource kinds the gateway exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Traffic influence subscription
    Subscription,
    /// PFD transaction
    PfdTransaction,
    /// Application inside a PFD transaction
    PfdApplication,
    /// Policy authorization application session
    AppSession,
}

impl LinkKind {
    /// Path anchor from which a downstream link is kept
    #[must_use]
    pub fn anchor(self) -> &'static str {
        match self {
            Self::Subscription => "/subscriptions/",
            Self::PfdTransaction | Self::PfdApplication => "/transactions/",
            Self::AppSession => "/app-sessions/",
        }
    }

    /// Gateway path prefix for the kind
    #[must_use]
    pub fn gateway_prefix(self) -> &'static str {
        match self {
            Self::Subscription => "",
            Self::PfdTransaction | Self::PfdApplication => "/pfd",
            Self::AppSession => "/policy-authorization",
        }
    }

    fn id_anchor(self) -> &'static str {
        match self {
            Self::PfdApplication => "/applications/",
            _ => self.anchor(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::PfdTransaction => "PFD transaction",
            Self::PfdApplication => "PFD application",
            Self::AppSession => "app session",
        }
    }
}

/// Re-roots downstream links under the gateway's address
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    base_url: String,
}

impl LinkRewriter {
    /// Rewriter for the advertised API endpoint
    #[must_use]
    pub fn new(advertised: &EndpointConfig) -> Self {
        Self {
            base_url: advertised.base_url(),
        }
    }

    /// Gateway address of the API root
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Rewrite one downstream link
    pub fn rewrite(&self, kind: LinkKind, link: &str) -> Result<String> {
        let start = link.find(kind.anchor()).ok_or(Error::MissingLink(kind.name()))?;
        Ok(format!(
            "{}{}{}",
            self.base_url,
            kind.gateway_prefix(),
            &link[start..]
        ))
    }

    /// Rewrite an optional link, failing when it is absent
    pub fn rewrite_required(&self, kind: LinkKind, link: Option<&str>) -> Result<String> {
        let link = link
            .filter(|l| !l.is_empty())
            .ok_or(Error::MissingLink(kind.name()))?;
        self.rewrite(kind, link)
    }
}

/// Resource id following the kind's anchor in a link
#[must_use]
pub fn resource_id(kind: LinkKind, link: &str) -> Option<&str> {
    let (_, rest) = link.split_once(kind.id_anchor())?;
    rest.split(['/', '?']).next().filter(|id| !id.is_empty())
}

/// Payloads carrying self-links
pub trait SelfLinked {
    /// Rewrite the payload's self-link and those of nested resources
    fn rewrite_links(&mut self, rewriter: &LinkRewriter) -> Result<()>;
}

impl SelfLinked for TrafficInfluSub {
    fn rewrite_links(&mut self, rewriter: &LinkRewriter) -> Result<()> {
        self.self_link = Some(rewriter.rewrite_required(LinkKind::Subscription, self.self_link.as_deref())?);
        Ok(())
    }
}

impl SelfLinked for PfdData {
    fn rewrite_links(&mut self, rewriter: &LinkRewriter) -> Result<()> {
        self.self_link = Some(rewriter.rewrite_required(LinkKind::PfdApplication, self.self_link.as_deref())?);
        Ok(())
    }
}

impl SelfLinked for PfdManagement {
    fn rewrite_links(&mut self, rewriter: &LinkRewriter) -> Result<()> {
        self.self_link = Some(rewriter.rewrite_required(LinkKind::PfdTransaction, self.self_link.as_deref())?);
        for application in self.pfd_datas.values_mut() {
            application.rewrite_links(rewriter)?;
        }
        Ok(())
    }
}

impl<T: SelfLinked> SelfLinked for Vec<T> {
    fn rewrite_links(&mut self, rewriter: &LinkRewriter) -> Result<()> {
        self.iter_mut().try_for_each(|item| item.rewrite_links(rewriter))
    }
}
