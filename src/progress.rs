//! Transfer hook for part uploads: (chunk size (diff), part bytes written, part size)

use std::convert::Infallible;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use aws_sdk_s3::operation::upload_part::builders::UploadPartFluentBuilder;
use aws_sdk_s3::operation::upload_part::UploadPartOutput;
use aws_sdk_s3::primitives::SdkBody;
use aws_smithy_http::body::BoxBody;
use bytes::Bytes;
use http::HeaderMap;
use http_body::{Body, SizeHint};
use pin_project::pin_project;

/// Shared transfer hook, cloned into every (re)built request body.
pub type TransferHook = Arc<dyn Fn(usize, u64, u64) + Send + Sync>;

#[pin_project]
struct ProgressBody<T> {
    #[pin]
    inner: T,
    hook: TransferHook,
    written: u64,
    length: u64,
}

impl<T> ProgressBody<T> {
    fn new(inner: T, hook: TransferHook, length: u64) -> Self {
        ProgressBody {
            inner,
            hook,
            written: 0,
            length,
        }
    }
}

impl<T> Body for ProgressBody<T>
where
    T: Body<Data = Bytes, Error = aws_smithy_http::body::Error>,
{
    type Data = Bytes;
    type Error = aws_smithy_http::body::Error;

    fn poll_data(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        let this = self.project();
        match this.inner.poll_data(cx) {
            Poll::Ready(Some(Ok(data))) => {
                *this.written += data.len() as u64;
                (this.hook)(data.len(), *this.written, *this.length);
                Poll::Ready(Some(Ok(data)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<HeaderMap>, Self::Error>> {
        self.project().inner.poll_trailers(cx)
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }
}

#[async_trait::async_trait]
pub trait TrackableRequest<R> {
    async fn send_tracked(self, hook: TransferHook) -> Result<R, aws_sdk_s3::Error>;
}

#[async_trait::async_trait]
impl TrackableRequest<UploadPartOutput> for UploadPartFluentBuilder {
    async fn send_tracked(self, hook: TransferHook) -> Result<UploadPartOutput, aws_sdk_s3::Error> {
        Ok(self
            .customize()
            .await?
            .map_request::<_, Infallible>(move |mut req| {
                let hook = hook.clone();
                // Extract current request body so it can be wrapped
                let body = mem::replace(req.body_mut(), SdkBody::taken()).map(move |body| {
                    let len = body.content_length().unwrap_or(0);
                    let body = ProgressBody::new(body, hook.clone(), len);
                    SdkBody::from_dyn(BoxBody::new(body))
                });

                let _ = mem::replace(req.body_mut(), body);

                Ok(req)
            })
            .send()
            .await?)
    }
}
